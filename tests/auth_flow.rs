mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_json, TestApp};
use contract_admin::auth::{Action, Resource};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
struct Permission {
    resource: String,
    action: String,
}

#[derive(Deserialize)]
struct Me {
    username: String,
    role: String,
    permissions: Vec<Permission>,
    permitted_contracts: Vec<Uuid>,
}

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let role_id = app
        .insert_role(
            "contracts-clerk",
            &[
                (Resource::ContractHeader, Action::Index),
                (Resource::ContractSubset, Action::Activation),
            ],
        )
        .await?;
    let user_id = app.insert_user("alice", "s3cret", role_id).await?;
    let header = app.insert_header(user_id, "Facilities").await?;
    let subset = app.insert_subset(user_id, header, None, "Cleaning").await?;
    app.grant_contract(role_id, subset).await?;

    let token = app.login_token("alice", "s3cret").await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let me: Me = serde_json::from_value(body_json(response).await?)?;

    assert_eq!(me.username, "alice");
    assert_eq!(me.role, "contracts-clerk");
    assert_eq!(me.permitted_contracts, vec![subset]);
    assert_eq!(me.permissions.len(), 2);
    assert!(me
        .permissions
        .iter()
        .any(|p| p.resource == "ContractSubset" && p.action == "activation"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_missing_token_are_unauthorized() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let role_id = app.insert_role("viewer", &[]).await?;
    app.insert_user("bob", "right-pass", role_id).await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &serde_json::json!({ "username": "bob", "password": "wrong-pass" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await?;
    assert_eq!(body["logical"], "unauthorized");

    let response = app.get("/api/contract-headers", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}
