//! Read-side collaborators consulted once per run at INIT.

pub mod customers;
pub mod index;

pub use customers::JsonCustomerSource;
pub use index::{cosine_similarity, HashingEmbedder, VectorIndex};

use crate::domain::types::{CustomerAttributes, CustomerId, Grounding, GroundingExample, Topic};
use crate::errors::RetrievalError;
use async_trait::async_trait;
use std::sync::Arc;

/// Customer data source. Read-only.
#[async_trait]
pub trait CustomerSource: Send + Sync {
    async fn fetch(&self, customer_id: &CustomerId) -> Result<CustomerAttributes, RetrievalError>;
}

/// Nearest-neighbor text retrieval. Read-only.
pub trait GroundingIndex: Send + Sync {
    /// Up to `k` examples, best first. Fewer (or none) is not an error.
    fn search(&self, query: &str, k: usize) -> Result<Vec<GroundingExample>, RetrievalError>;
}

/// Produces the fixed grounding context for a run.
#[derive(Clone)]
pub struct RetrievalContext {
    customers: Arc<dyn CustomerSource>,
    index: Arc<dyn GroundingIndex>,
}

impl RetrievalContext {
    pub fn new(customers: Arc<dyn CustomerSource>, index: Arc<dyn GroundingIndex>) -> Self {
        Self { customers, index }
    }

    /// Ordered grounding examples for a topic.
    pub fn retrieve(&self, topic: &Topic, k: usize) -> Result<Vec<GroundingExample>, RetrievalError> {
        let mut examples = self.index.search(topic.as_str(), k)?;
        examples.truncate(k);
        Ok(examples)
    }

    /// Customer snapshot plus examples. The customer is looked up first so an
    /// unknown customer fails before any retrieval happens.
    pub async fn ground(
        &self,
        customer_id: &CustomerId,
        topic: &Topic,
        k: usize,
    ) -> Result<Grounding, RetrievalError> {
        let attributes = self.customers.fetch(customer_id).await?;
        let examples = self.retrieve(topic, k)?;
        tracing::debug!(
            customer_id = %customer_id,
            examples = examples.len(),
            requested = k,
            "Grounding fetched"
        );
        Ok(Grounding {
            attributes,
            examples,
        })
    }
}
