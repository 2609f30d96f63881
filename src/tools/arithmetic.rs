//! Two-operand arithmetic tools

use super::{InputSchema, Tool};
use crate::error::AdvisorError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
        Operation::Power,
    ];

    pub fn apply(self, a: f64, b: f64) -> Result<f64> {
        let result = match self {
            Operation::Add => a + b,
            Operation::Subtract => a - b,
            Operation::Multiply => a * b,
            Operation::Divide => {
                if b == 0.0 {
                    return Err(AdvisorError::Arithmetic("division by zero".to_string()));
                }
                a / b
            }
            Operation::Power => a.powf(b),
        };

        if !result.is_finite() {
            return Err(AdvisorError::Arithmetic(format!(
                "{} of {} and {} is not a finite number",
                self.name(),
                a,
                b
            )));
        }
        Ok(result)
    }

    fn name(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
            Operation::Power => "power",
        }
    }
}

pub struct ArithmeticTool {
    op: Operation,
}

impl ArithmeticTool {
    pub fn new(op: Operation) -> Self {
        Self { op }
    }
}

#[async_trait::async_trait]
impl Tool for ArithmeticTool {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn description(&self) -> &'static str {
        match self.op {
            Operation::Add => "Adds two numbers a and b.",
            Operation::Subtract => "Subtracts b from a.",
            Operation::Multiply => "Multiplies two numbers a and b.",
            Operation::Divide => "Divides a by b. b must not be zero.",
            Operation::Power => "Raises a to the power of b.",
        }
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::Numbers(2)
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let (a, b) = match input {
            ToolInput::Numbers(n) if n.len() == 2 => (n[0], n[1]),
            other => {
                return Err(AdvisorError::InvalidToolInput(format!(
                    "{} expects two numbers, got {:?}",
                    self.op.name(),
                    other
                )))
            }
        };

        let result = self.op.apply(a, b)?;
        Ok(ToolOutput::text(format_number(result)))
    }
}

/// Integral values print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(op: Operation, a: f64, b: f64) -> Result<String> {
        ArithmeticTool::new(op)
            .execute(&ToolInput::Numbers(vec![a, b]))
            .await
            .map(|o| o.text)
    }

    #[tokio::test]
    async fn test_operations() {
        assert_eq!(run(Operation::Add, 2.0, 3.0).await.unwrap(), "5");
        assert_eq!(run(Operation::Subtract, 2.0, 3.5).await.unwrap(), "-1.5");
        assert_eq!(run(Operation::Multiply, 1.5, 4.0).await.unwrap(), "6");
        assert_eq!(run(Operation::Divide, 10.0, 4.0).await.unwrap(), "2.5");
        assert_eq!(run(Operation::Power, 2.0, 10.0).await.unwrap(), "1024");
    }

    #[tokio::test]
    async fn test_division_by_zero() {
        let result = run(Operation::Divide, 1.0, 0.0).await;
        assert!(matches!(result, Err(AdvisorError::Arithmetic(_))));
    }

    #[tokio::test]
    async fn test_non_finite_result() {
        let result = run(Operation::Power, 10.0, 400.0).await;
        assert!(matches!(result, Err(AdvisorError::Arithmetic(_))));

        let result = run(Operation::Power, -8.0, 0.5).await;
        assert!(matches!(result, Err(AdvisorError::Arithmetic(_))));
    }
}
