use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{ExampleFilter, OrderDirection};

/// Request to create a new example.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateExampleRequest {
    #[validate(length(min = 1, message = "example_name cannot be empty"))]
    pub example_name: String,
    #[validate(length(min = 1, message = "example_content cannot be empty"))]
    pub example_content: String,
}

/// Partial update of an example.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateExampleRequest {
    #[validate(length(min = 1, message = "example_name cannot be empty"))]
    pub example_name: Option<String>,
    pub example_content: Option<String>,
}

/// Query parameters for listing examples.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListExamplesQuery {
    pub example_name_like: Option<String>,
    pub example_content_ilike: Option<String>,
    pub order_by_name: Option<OrderDirection>,
}

impl From<ListExamplesQuery> for ExampleFilter {
    fn from(query: ListExamplesQuery) -> Self {
        Self {
            name_like: query.example_name_like,
            content_ilike: query.example_content_ilike,
            order_by_name: query.order_by_name,
        }
    }
}

impl From<CreateExampleRequest> for crate::services::CreateExampleRequest {
    fn from(request: CreateExampleRequest) -> Self {
        Self {
            name: request.example_name,
            content: request.example_content,
        }
    }
}

impl From<UpdateExampleRequest> for crate::services::UpdateExampleRequest {
    fn from(request: UpdateExampleRequest) -> Self {
        Self {
            name: request.example_name,
            content: request.example_content,
        }
    }
}
