use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Example, ExampleFilter, OrderDirection};

/// Storage for example entities.
#[async_trait]
pub trait ExampleRepository: Send + Sync {
    async fn create(&self, example: &Example) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Example>>;

    async fn update(&self, example: &Example) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list(&self, filter: &ExampleFilter) -> Result<Vec<Example>>;
}

/// In-process repository for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryExampleRepository {
    examples: RwLock<HashMap<Uuid, Example>>,
}

impl InMemoryExampleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.examples.read().await.len()
    }
}

#[async_trait]
impl ExampleRepository for InMemoryExampleRepository {
    async fn create(&self, example: &Example) -> Result<()> {
        let mut examples = self.examples.write().await;
        if examples.contains_key(&example.id) {
            return Err(AppError::Conflict(format!(
                "Example {} already exists",
                example.id
            )));
        }
        examples.insert(example.id, example.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Example>> {
        Ok(self.examples.read().await.get(&id).cloned())
    }

    async fn update(&self, example: &Example) -> Result<()> {
        let mut examples = self.examples.write().await;
        match examples.get_mut(&example.id) {
            Some(existing) => {
                *existing = example.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Example {} not found", example.id))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.examples.write().await.remove(&id).is_some())
    }

    async fn list(&self, filter: &ExampleFilter) -> Result<Vec<Example>> {
        let mut examples: Vec<Example> = self
            .examples
            .read()
            .await
            .values()
            .filter(|example| filter.matches(example))
            .cloned()
            .collect();

        match filter.order_by_name {
            Some(OrderDirection::Asc) => examples.sort_by(|a, b| a.name.cmp(&b.name)),
            Some(OrderDirection::Desc) => examples.sort_by(|a, b| b.name.cmp(&a.name)),
            None => examples.sort_by_key(|example| example.created_at),
        }

        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = InMemoryExampleRepository::new();
        let example = Example::new("a", "b");

        repo.create(&example).await.unwrap();

        assert_eq!(repo.find_by_id(example.id).await.unwrap(), Some(example.clone()));
        assert!(matches!(
            repo.create(&example).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_example() {
        let repo = InMemoryExampleRepository::new();
        let example = Example::new("a", "b");

        assert!(matches!(
            repo.update(&example).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_ordering() {
        let repo = InMemoryExampleRepository::new();
        for name in ["bravo", "alpha", "charlie"] {
            repo.create(&Example::new(name, "content")).await.unwrap();
        }

        let filter = ExampleFilter {
            order_by_name: Some(OrderDirection::Desc),
            ..Default::default()
        };
        let names: Vec<String> = repo
            .list(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|example| example.name)
            .collect();

        assert_eq!(names, vec!["charlie", "bravo", "alpha"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryExampleRepository::new();
        let example = Example::new("a", "b");
        repo.create(&example).await.unwrap();

        assert!(repo.delete(example.id).await.unwrap());
        assert!(!repo.delete(example.id).await.unwrap());
        assert_eq!(repo.count().await, 0);
    }
}
