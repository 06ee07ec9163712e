use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Example, ExampleFilter};
use crate::repositories::ExampleRepository;

/// Request to create a new example.
#[derive(Debug, Clone)]
pub struct CreateExampleRequest {
    pub name: String,
    pub content: String,
}

/// Request to update an example. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateExampleRequest {
    pub name: Option<String>,
    pub content: Option<String>,
}

/// Service for example management operations.
#[derive(Clone)]
pub struct ExampleService {
    repo: Arc<dyn ExampleRepository>,
}

impl ExampleService {
    pub fn new(repo: Arc<dyn ExampleRepository>) -> Self {
        Self { repo }
    }

    /// Creates a new example with validation.
    pub async fn create_example(&self, request: CreateExampleRequest) -> Result<Example> {
        if request.name.trim().is_empty() {
            return Err(AppError::Validation("Example name cannot be empty".to_string()));
        }
        if request.content.trim().is_empty() {
            return Err(AppError::Validation(
                "Example content cannot be empty".to_string(),
            ));
        }

        let example = Example::new(request.name, request.content);
        self.repo.create(&example).await?;

        tracing::info!(example_id = %example.id, "Created example");
        Ok(example)
    }

    pub async fn get_example(&self, id: Uuid) -> Result<Example> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Example {} not found", id)))
    }

    pub async fn update_example(&self, id: Uuid, request: UpdateExampleRequest) -> Result<Example> {
        if matches!(request.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(AppError::Validation("Example name cannot be empty".to_string()));
        }

        let mut example = self.get_example(id).await?;
        example.apply_update(request.name, request.content);
        self.repo.update(&example).await?;

        Ok(example)
    }

    pub async fn delete_example(&self, id: Uuid) -> Result<()> {
        if !self.repo.delete(id).await? {
            return Err(AppError::NotFound(format!("Example {} not found", id)));
        }
        tracing::info!(example_id = %id, "Deleted example");
        Ok(())
    }

    pub async fn list_examples(&self, filter: ExampleFilter) -> Result<Vec<Example>> {
        self.repo.list(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryExampleRepository;

    fn service() -> ExampleService {
        ExampleService::new(Arc::new(InMemoryExampleRepository::new()))
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let result = service()
            .create_example(CreateExampleRequest {
                name: "  ".to_string(),
                content: "b".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_and_get() {
        let service = service();
        let created = service
            .create_example(CreateExampleRequest {
                name: "a".to_string(),
                content: "b".to_string(),
            })
            .await
            .unwrap();

        let updated = service
            .update_example(
                created.id,
                UpdateExampleRequest {
                    name: Some("renamed".to_string()),
                    content: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.content, "b");
        assert_eq!(service.get_example(created.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_missing_example() {
        let service = service();
        let id = Uuid::new_v4();

        assert!(matches!(
            service.get_example(id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_example(id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
