//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Extension, Form, Json, Router,
    extract::{Path, Query as Params, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use query_core::Query;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::debug;

use super::filters::authenticate;
use crate::authentication::{
    AnonymousAuthenticator, AuthenticatorChain, BearerTokenAuthenticator, PasswordAuthenticator,
    TokenIssuer, TokenOperator,
};
use crate::authorization::{Attributes, Authorizer, RbacAuthorizer, Scope};
use crate::cache::CacheClient;
use crate::config::AuthenticationOptions;
use crate::iam::AccessOperator;
use crate::objects::{Object, ObjectCache};
use crate::resources::names::ROLES;
use crate::resources::{ListResult, ResourceGetter, items_json, v1alpha2, v1alpha3};
use crate::tenant::TenantOperator;
use crate::{Error, Identity, Result};

const V1ALPHA2_PREFIX: &str = "/kapis/resources.kubesphere.io/v1alpha2";
const V1ALPHA3_PREFIX: &str = "/kapis/resources.kubesphere.io/v1alpha3";
const TENANT_PREFIX: &str = "/kapis/tenant.kubesphere.io/v1alpha2";
const IAM_PREFIX: &str = "/kapis/iam.kubesphere.io/v1alpha2";

/// Authorization resource for project membership.
const MEMBERS: &str = "members";

/// Shared application state
pub struct AppState {
    /// Object cache every registry reads from
    pub objects: Arc<ObjectCache>,
    /// Request authenticators, in order
    pub authenticator: AuthenticatorChain,
    /// Username/password verification for the token endpoint
    pub password: Arc<PasswordAuthenticator>,
    /// Token issuance and revocation
    pub tokens: Arc<TokenOperator>,
    /// Access decisions
    pub authorizer: Arc<dyn Authorizer>,
    /// Legacy resource registry
    pub v1alpha2: Arc<v1alpha2::ResourceGetter>,
    /// Current resource registry
    pub v1alpha3: Arc<v1alpha3::ResourceGetter>,
    /// Workspace queries
    pub tenant: Arc<TenantOperator>,
    /// DevOps project members and roles
    pub iam: Arc<AccessOperator>,
}

impl AppState {
    /// Wire every component over `objects` and the credential store `cache`.
    pub fn new(
        objects: Arc<ObjectCache>,
        cache: Arc<dyn CacheClient>,
        options: &AuthenticationOptions,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::from_options(options));
        let tokens = Arc::new(TokenOperator::new(issuer, Arc::clone(&cache), options));
        let password = Arc::new(PasswordAuthenticator::new(
            objects.users.clone(),
            cache,
            options,
        ));
        let authenticator = AuthenticatorChain::new()
            .with(Arc::new(AnonymousAuthenticator))
            .with(Arc::new(BearerTokenAuthenticator::new(tokens.clone())));

        let authorizer: Arc<dyn Authorizer> = Arc::new(RbacAuthorizer::new(&objects));
        let v1alpha2 = Arc::new(v1alpha2::ResourceGetter::from_cache(&objects));
        let v1alpha3 = Arc::new(v1alpha3::ResourceGetter::from_cache(&objects));
        let tenant = Arc::new(TenantOperator::new(
            Arc::clone(&authorizer),
            Arc::clone(&v1alpha3),
            &objects,
        ));
        let iam = Arc::new(AccessOperator::new(&objects));

        Self {
            objects,
            authenticator,
            password,
            tokens,
            authorizer,
            v1alpha2,
            v1alpha3,
            tenant,
            iam,
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(&format!("{V1ALPHA2_PREFIX}/{{resources}}"), get(list_v1alpha2))
        .route(&format!("{V1ALPHA2_PREFIX}/{{resources}}/{{name}}"), get(get_v1alpha2))
        .route(
            &format!("{V1ALPHA2_PREFIX}/namespaces/{{namespace}}/{{resources}}"),
            get(list_v1alpha2),
        )
        .route(
            &format!("{V1ALPHA2_PREFIX}/namespaces/{{namespace}}/{{resources}}/{{name}}"),
            get(get_v1alpha2),
        )
        .route(&format!("{V1ALPHA3_PREFIX}/{{resources}}"), get(list_v1alpha3))
        .route(&format!("{V1ALPHA3_PREFIX}/{{resources}}/{{name}}"), get(get_v1alpha3))
        .route(
            &format!("{V1ALPHA3_PREFIX}/namespaces/{{namespace}}/{{resources}}"),
            get(list_v1alpha3),
        )
        .route(
            &format!("{V1ALPHA3_PREFIX}/namespaces/{{namespace}}/{{resources}}/{{name}}"),
            get(get_v1alpha3),
        )
        .route(
            &format!("{TENANT_PREFIX}/workspaces/{{workspace}}/devops"),
            get(list_devops_projects),
        )
        .route(
            &format!(
                "{TENANT_PREFIX}/workspaces/{{workspace}}/workspacemembers/{{workspacemember}}/devops"
            ),
            get(list_member_devops_projects),
        )
        .route(&format!("{IAM_PREFIX}/devops/{{devops}}/members"), get(list_members))
        .route(
            &format!("{IAM_PREFIX}/devops/{{devops}}/members/{{member}}"),
            get(describe_member),
        )
        .route(
            &format!("{IAM_PREFIX}/devops/{{devops}}/members/{{member}}/roles"),
            get(member_role_templates),
        )
        .route(&format!("{IAM_PREFIX}/devops/{{devops}}/roles"), get(list_roles))
        .route(
            &format!("{IAM_PREFIX}/devops/{{devops}}/roles/{{role}}"),
            get(describe_role),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            authenticate,
        ));

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/oauth/token", post(token_handler))
        .merge(api)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resource address taken from the route.
#[derive(Debug, Deserialize)]
struct ResourcePath {
    #[serde(default)]
    namespace: String,
    resources: String,
    #[serde(default)]
    name: Option<String>,
}

impl ResourcePath {
    fn scope(&self) -> Scope {
        if self.namespace.is_empty() {
            Scope::Cluster
        } else {
            Scope::Namespace(self.namespace.clone())
        }
    }
}

/// Tenant route parameters.
#[derive(Debug, Deserialize)]
struct WorkspacePath {
    workspace: String,
    #[serde(default)]
    workspacemember: Option<String>,
}

/// DevOps project route parameters.
#[derive(Debug, Deserialize)]
struct DevopsPath {
    devops: String,
    #[serde(default)]
    member: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

type RawParams = Params<Vec<(String, String)>>;

fn pairs(params: &[(String, String)]) -> impl Iterator<Item = (&str, &str)> {
    params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
}

fn authorize(state: &AppState, attributes: &Attributes) -> Result<()> {
    let decision = state.authorizer.authorize(attributes)?;
    if decision.is_allowed() {
        Ok(())
    } else {
        debug!(
            user = %attributes.user.name,
            verb = %attributes.verb,
            resource = %attributes.resource,
            scope = %attributes.scope,
            "Request denied"
        );
        Err(Error::Forbidden(decision.reason))
    }
}

fn authorize_resource(
    state: &AppState,
    identity: &Identity,
    verb: &str,
    path: &ResourcePath,
) -> Result<()> {
    let mut attributes = Attributes::new(identity.clone(), verb, &path.resources, path.scope());
    if let Some(name) = &path.name {
        attributes = attributes.named(name.clone());
    }
    authorize(state, &attributes)
}

/// Health check handler
///
/// Reports 503 until the object cache holds its initial snapshot.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.objects.has_synced() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "object cache not synced")
    }
}

/// Password grant form.
#[derive(Debug, Deserialize)]
struct TokenRequest {
    grant_type: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Token endpoint (password grant only)
async fn token_handler(
    State(state): State<Arc<AppState>>,
    Form(request): Form<TokenRequest>,
) -> Result<Response> {
    if request.grant_type != "password" {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "unsupported_grant_type",
                "error_description": format!("grant type '{}' is not supported", request.grant_type),
            })),
        )
            .into_response());
    }

    let identity = state
        .password
        .authenticate(&request.username, &request.password)
        .await?;
    let token = state.tokens.issue_to(&identity).await?;
    Ok(Json(token).into_response())
}

async fn list_v1alpha2(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<ResourcePath>,
    Params(params): RawParams,
) -> Result<Json<Value>> {
    let query = Query::from_legacy_params(pairs(&params))?;
    authorize_resource(&state, &identity, "list", &path)?;
    let page = state
        .v1alpha2
        .list(&path.resources, &path.namespace, &query)?;
    Ok(Json(json!({
        "items": items_json(&page),
        "total_count": page.total_count,
    })))
}

async fn get_v1alpha2(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<ResourcePath>,
) -> Result<Json<Value>> {
    authorize_resource(&state, &identity, "get", &path)?;
    let name = path.name.as_deref().unwrap_or_default();
    let object = state.v1alpha2.get(&path.resources, &path.namespace, name)?;
    Ok(Json(object.to_json()))
}

async fn list_v1alpha3(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<ResourcePath>,
    Params(params): RawParams,
) -> Result<Json<Value>> {
    let query = Query::from_params(pairs(&params))?;
    authorize_resource(&state, &identity, "list", &path)?;
    let page = match state.v1alpha3.list(&path.resources, &path.namespace, &query) {
        Err(Error::NotSupported(_)) => {
            debug!(resource = %path.resources, "Falling back to the legacy registry");
            state
                .v1alpha2
                .list(&path.resources, &path.namespace, &query)?
        }
        page => page?,
    };
    Ok(list_json(&page))
}

async fn get_v1alpha3(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<ResourcePath>,
) -> Result<Json<Value>> {
    authorize_resource(&state, &identity, "get", &path)?;
    let name = path.name.as_deref().unwrap_or_default();
    let object = match state.v1alpha3.get(&path.resources, &path.namespace, name) {
        Err(Error::NotSupported(_)) => {
            state
                .v1alpha2
                .get(&path.resources, &path.namespace, name)?
        }
        object => object?,
    };
    Ok(Json(object.to_json()))
}

async fn list_devops_projects(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<WorkspacePath>,
    Params(params): RawParams,
) -> Result<Json<Value>> {
    let query = Query::from_params(pairs(&params))?;
    let page = state
        .tenant
        .list_devops_projects(&identity, &path.workspace, &query)?;
    Ok(list_json(&page))
}

/// Projects visible to the member named in the path.
///
/// Looking at someone else's view needs `get workspacemembers` in the
/// workspace.
async fn list_member_devops_projects(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<WorkspacePath>,
    Params(params): RawParams,
) -> Result<Json<Value>> {
    let query = Query::from_params(pairs(&params))?;
    let member = path.workspacemember.unwrap_or_default();
    if member != identity.name {
        authorize(
            &state,
            &Attributes::new(
                identity.clone(),
                "get",
                "workspacemembers",
                Scope::Workspace(path.workspace.clone()),
            )
            .named(member.clone()),
        )?;
    }

    let page = state
        .tenant
        .list_devops_projects(&Identity::named(member), &path.workspace, &query)?;
    Ok(list_json(&page))
}

fn list_json(page: &ListResult) -> Json<Value> {
    Json(json!({
        "items": items_json(page),
        "totalItems": page.total_count,
    }))
}

/// Authorize `verb` on `resource` in the project's namespace and return that
/// namespace.
fn authorize_devops(
    state: &AppState,
    identity: &Identity,
    verb: &str,
    resource: &str,
    devops: &str,
    name: Option<&str>,
) -> Result<String> {
    let namespace = state.iam.namespace_of(devops);
    let mut attributes = Attributes::new(
        identity.clone(),
        verb,
        resource,
        Scope::Namespace(namespace.clone()),
    );
    if let Some(name) = name {
        attributes = attributes.named(name.to_string());
    }
    authorize(state, &attributes)?;
    Ok(namespace)
}

async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<DevopsPath>,
    Params(params): RawParams,
) -> Result<Json<Value>> {
    let query = Query::from_params(pairs(&params))?;
    let namespace = authorize_devops(&state, &identity, "list", MEMBERS, &path.devops, None)?;
    Ok(list_json(&state.iam.list_members(&namespace, &query)))
}

async fn describe_member(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<DevopsPath>,
) -> Result<Json<Value>> {
    let member = path.member.unwrap_or_default();
    let namespace = authorize_devops(
        &state,
        &identity,
        "get",
        MEMBERS,
        &path.devops,
        Some(member.as_str()),
    )?;
    let user = state.iam.describe_member(&namespace, &member)?;
    Ok(Json(user.to_json()))
}

/// Role templates of a member. Members may always read their own.
async fn member_role_templates(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<DevopsPath>,
) -> Result<Json<Value>> {
    let member = path.member.unwrap_or_default();
    let namespace = if member == identity.name {
        state.iam.namespace_of(&path.devops)
    } else {
        authorize_devops(
            &state,
            &identity,
            "get",
            MEMBERS,
            &path.devops,
            Some(member.as_str()),
        )?
    };
    let templates: Vec<Value> = state
        .iam
        .member_role_templates(&namespace, &member)
        .iter()
        .map(|role| role.to_json())
        .collect();
    Ok(Json(Value::Array(templates)))
}

async fn list_roles(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<DevopsPath>,
    Params(params): RawParams,
) -> Result<Json<Value>> {
    let query = Query::from_params(pairs(&params))?;
    let namespace = authorize_devops(&state, &identity, "list", ROLES, &path.devops, None)?;
    Ok(list_json(&state.iam.list_roles(&namespace, &query)))
}

async fn describe_role(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(path): Path<DevopsPath>,
) -> Result<Json<Value>> {
    let role = path.role.unwrap_or_default();
    let namespace = authorize_devops(
        &state,
        &identity,
        "get",
        ROLES,
        &path.devops,
        Some(role.as_str()),
    )?;
    Ok(Json(state.iam.describe_role(&namespace, &role)?.to_json()))
}
