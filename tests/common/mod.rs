use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use contract_admin::auth::jwt::JwtService;
use contract_admin::auth::{password, Action, Resource};
use contract_admin::config::{AppConfig, StorageBackend};
use contract_admin::db::{self, PgPool};
use contract_admin::models::{
    NewContractHeader, NewContractSubset, NewEmployee, NewRole, NewUser, RoleContractSubset,
    RolePermission,
};
use contract_admin::routes;
use contract_admin::schema::{
    contract_headers, contract_subsets, employees, role_contract_subsets, role_permissions,
    roles, users,
};
use contract_admin::state::AppState;
use contract_admin::storage::ObjectStorage;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// In-memory object store keyed like the real backends.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<()> {
        self.objects.lock().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut guard = self.objects.lock().await;
        let before = guard.len();
        guard.retain(|key, _| !key.starts_with(prefix));
        Ok(before - guard.len())
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        let bytes = guard
            .remove(from)
            .ok_or_else(|| anyhow!("object {from} missing"))?;
        guard.insert(to.to_string(), bytes);
        Ok(())
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.list_objects(prefix).await.unwrap_or_default()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

/// A multipart file part.
#[allow(dead_code)]
pub struct FilePart<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub data: &'a [u8],
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            storage_backend: StorageBackend::Local,
            storage_root: env::temp_dir().join("contract-admin-tests-unused"),
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, storage_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub async fn insert_role(&self, name: &str, grants: &[(Resource, Action)]) -> Result<Uuid> {
        let role = NewRole {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        let permissions: Vec<RolePermission> = grants
            .iter()
            .map(|(resource, action)| RolePermission {
                role_id: role.id,
                resource: resource.as_str().to_string(),
                action: action.as_str().to_string(),
            })
            .collect();

        self.with_conn(move |conn| {
            diesel::insert_into(roles::table)
                .values(&role)
                .execute(conn)
                .context("failed to insert role")?;
            if !permissions.is_empty() {
                diesel::insert_into(role_permissions::table)
                    .values(&permissions)
                    .execute(conn)
                    .context("failed to insert role permissions")?;
            }
            Ok(role.id)
        })
        .await
    }

    pub async fn insert_user(&self, username: &str, plain: &str, role_id: Uuid) -> Result<Uuid> {
        let username = username.to_string();
        let plain = plain.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                password_hash: password::hash_password(&plain)?,
                role_id,
            };
            diesel::insert_into(users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    /// Creates a role with `grants`, a user holding it, and logs them in.
    #[allow(dead_code)]
    pub async fn staff(&self, username: &str, grants: &[(Resource, Action)]) -> Result<Staff> {
        let role_id = self.insert_role(&format!("{username}-role"), grants).await?;
        let user_id = self.insert_user(username, "staff-pass", role_id).await?;
        let token = self.login_token(username, "staff-pass").await?;
        Ok(Staff {
            user_id,
            role_id,
            token,
        })
    }

    #[allow(dead_code)]
    pub async fn insert_header(&self, owner: Uuid, name: &str) -> Result<Uuid> {
        let header = NewContractHeader {
            id: Uuid::new_v4(),
            name: name.to_string(),
            workplace: "Head office".to_string(),
            user_id: owner,
            files: false,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(contract_headers::table)
                .values(&header)
                .execute(conn)
                .context("failed to insert contract header")?;
            Ok(header.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_subset(
        &self,
        owner: Uuid,
        header_id: Uuid,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> Result<Uuid> {
        let subset = NewContractSubset {
            id: Uuid::new_v4(),
            contract_header_id: header_id,
            parent_id,
            name: name.to_string(),
            workplace: "Site".to_string(),
            user_id: owner,
            files: false,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(contract_subsets::table)
                .values(&subset)
                .execute(conn)
                .context("failed to insert contract subset")?;
            Ok(subset.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_employee(
        &self,
        subset_id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<Uuid> {
        let employee = NewEmployee {
            id: Uuid::new_v4(),
            contract_subset_id: subset_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(employees::table)
                .values(&employee)
                .execute(conn)
                .context("failed to insert employee")?;
            Ok(employee.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn grant_contract(&self, role_id: Uuid, subset_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(role_contract_subsets::table)
                .values(&RoleContractSubset {
                    role_id,
                    contract_subset_id: subset_id,
                })
                .execute(conn)
                .context("failed to grant contract")?;
            Ok(())
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.empty_request(Method::GET, path, token).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.empty_request(Method::DELETE, path, token).await
    }

    #[allow(dead_code)]
    pub async fn patch(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.empty_request(Method::PATCH, path, token).await
    }

    /// Sends a `multipart/form-data` request with text fields and files.
    #[allow(dead_code)]
    pub async fn send_form(
        &self,
        method: Method,
        path: &str,
        fields: &[(&str, &str)],
        files: &[FilePart<'_>],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();

        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }

        for file in files {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    file.field, file.filename
                )
                .as_bytes(),
            );
            body.extend(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend(file.data);
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.send(request).await
    }

    async fn empty_request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

#[allow(dead_code)]
pub struct Staff {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub token: String,
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_json(response: hyper::Response<Body>) -> Result<serde_json::Value> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        db::run_migrations(&mut conn)?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE advantage_automations, invoice_automations, performance_automations, \
         advantages, automation_periods, employees, role_contract_subsets, contract_subsets, \
         contract_headers, role_permissions, users, roles RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
