use super::CustomerSource;
use crate::domain::types::{CustomerAttributes, CustomerId};
use crate::errors::RetrievalError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Customer records loaded once from a JSON array file.
pub struct JsonCustomerSource {
    customers: HashMap<CustomerId, CustomerAttributes>,
}

impl JsonCustomerSource {
    pub fn from_records(records: Vec<CustomerAttributes>) -> Self {
        let customers = records
            .into_iter()
            .filter(|record| {
                let valid = record.churn_risk.is_finite() && (0.0..=1.0).contains(&record.churn_risk);
                if !valid {
                    tracing::warn!(
                        customer_id = %record.customer_id,
                        churn_risk = record.churn_risk,
                        "Skipping customer with churn_risk outside [0, 1]"
                    );
                }
                valid
            })
            .map(|record| (record.customer_id.clone(), record))
            .collect();
        Self { customers }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read customers file: {}", path.display()))?;
        let records: Vec<CustomerAttributes> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse customers file: {}", path.display()))?;
        tracing::info!(count = records.len(), path = %path.display(), "Loaded customer records");
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

#[async_trait]
impl CustomerSource for JsonCustomerSource {
    async fn fetch(&self, customer_id: &CustomerId) -> Result<CustomerAttributes, RetrievalError> {
        self.customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| RetrievalError::CustomerNotFound(customer_id.to_string()))
    }
}
