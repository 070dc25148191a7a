//! Model pricing and cost estimation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub currency: String,
}

impl ModelPricing {
    pub fn new(model: &str, input: f64, output: f64) -> Self {
        Self {
            model: model.into(),
            input_cost_per_1k: input,
            output_cost_per_1k: output,
            currency: "USD".into(),
        }
    }

    /// Pricing for models with no cost entry (self-hosted, unknown).
    pub fn free(model: &str) -> Self {
        Self::new(model, 0.0, 0.0)
    }

    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> CostEstimate {
        let ic = (input_tokens as f64 / 1000.0) * self.input_cost_per_1k;
        let oc = (output_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        CostEstimate {
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            input_cost: ic,
            output_cost: oc,
            total_cost: ic + oc,
            currency: self.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub currency: String,
}

impl CostEstimate {
    pub fn format(&self) -> String {
        format!("{} {:.6}", self.currency, self.total_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cost() {
        let pricing = ModelPricing::new("gpt-4o-mini", 0.00015, 0.0006);
        let est = pricing.calculate_cost(2000, 1000);
        assert!((est.input_cost - 0.0003).abs() < 1e-12);
        assert!((est.output_cost - 0.0006).abs() < 1e-12);
        assert!((est.total_cost - 0.0009).abs() < 1e-12);
        assert_eq!(est.format(), "USD 0.000900");
    }

    #[test]
    fn test_free_pricing() {
        let est = ModelPricing::free("llama3.1").calculate_cost(10_000, 10_000);
        assert_eq!(est.total_cost, 0.0);
    }
}
