use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use common::http::{json_error, ApiError, JsonResult};
use serde::{Deserialize, Serialize};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::store::{Expense, ExpenseStore};

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub title: Option<String>,
    pub amount: Option<f64>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: String,
}

fn store_error(err: impl std::fmt::Display) -> ApiError {
    error!("Expense store failure: {}", err);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_failed")
}

pub fn expenses_router(store: ExpenseStore) -> Router {
    Router::new()
        .route("/post", post(create_expense))
        .route("/get", get(list_expenses))
        .route("/delete/:id", delete(delete_expense))
        .with_state(store)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}

async fn create_expense(
    State(store): State<ExpenseStore>,
    payload: Option<Json<CreateExpenseRequest>>,
) -> JsonResult<Expense> {
    let Some(Json(payload)) = payload else {
        return Err(json_error(StatusCode::BAD_REQUEST, "title and amount are required"));
    };
    let title = payload
        .title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "title is required"))?;
    let amount = payload
        .amount
        .filter(|amount| amount.is_finite())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "amount must be a number"))?;
    let expense = store.create(title, amount).map_err(store_error)?;
    Ok(Json(expense))
}

async fn list_expenses(State(store): State<ExpenseStore>) -> JsonResult<Vec<Expense>> {
    let items = store.list().map_err(store_error)?;
    Ok(Json(items))
}

async fn delete_expense(
    State(store): State<ExpenseStore>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<DeleteResponse> {
    if store.delete(&id).map_err(store_error)? {
        Ok(Json(DeleteResponse { deleted: id }))
    } else {
        Err(json_error(StatusCode::NOT_FOUND, "expense not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn crud_round() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExpenseStore::open(&dir.path().join("expenses.redb")).unwrap();
        let app = expenses_router(store);

        let (status, created) = send(
            &app,
            Method::POST,
            "/post",
            Some(json!({ "title": "Coffee", "amount": 3.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["title"], json!("Coffee"));
        assert_eq!(created["amount"], json!(3.5));
        assert!(created["createdAt"].as_u64().unwrap() > 0);
        let id = created["id"].as_str().unwrap().to_string();

        let (_, listed) = send(&app, Method::GET, "/get", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, body) = send(&app, Method::DELETE, &format!("/delete/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "deleted": id }));

        let (status, _) = send(&app, Method::DELETE, &format!("/delete/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, listed) = send(&app, Method::GET, "/get", None).await;
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn rejects_invalid_expenses() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExpenseStore::open(&dir.path().join("expenses.redb")).unwrap();
        let app = expenses_router(store);

        for payload in [
            json!({ "amount": 3 }),
            json!({ "title": "  ", "amount": 3 }),
            json!({ "title": "Tea" }),
            json!({ "title": "Tea", "amount": "three" }),
        ] {
            let (status, _) = send(&app, Method::POST, "/post", Some(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, _) = send(&app, Method::POST, "/post", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
