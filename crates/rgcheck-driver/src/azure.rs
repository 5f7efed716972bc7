use std::collections::{BTreeMap, HashMap};
use std::process::Command as StdCommand;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rgcheck_domain::{
    LockLevel, ObservedLock, ObservedResourceGroup, ObservedRoleBinding, SubscriptionId,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::fetcher::Fetcher;

const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
const LOCKS_API_VERSION: &str = "2016-09-01";
const AUTHORIZATION_API_VERSION: &str = "2022-04-01";

/// Upper bound on `nextLink` hops for a single list call.
const MAX_PAGES: usize = 1000;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Operator-level settings for the live ARM fetcher.
#[derive(Clone)]
pub struct AzureFetcherConfig {
    pub subscription_id: SubscriptionId,
    /// Azure tenant ID (GUID). Required for service principal auth; passed to
    /// the Azure CLI when set.
    pub tenant_id: Option<String>,
    /// Service principal client ID (optional; falls back to env, MSI, CLI).
    pub client_id: Option<String>,
    /// Service principal client secret.
    pub client_secret: Option<String>,
    /// Deadline applied to every HTTP request.
    pub request_timeout: Duration,
    /// Look up the display name of each role definition seen in an assignment.
    pub resolve_role_names: bool,
}

impl AzureFetcherConfig {
    pub fn new(subscription_id: SubscriptionId) -> Self {
        Self {
            subscription_id,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            request_timeout: Duration::from_secs(30),
            resolve_role_names: false,
        }
    }
}

// ── Base URLs (overridden in tests) ───────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct BaseUrls {
    management: String,
    login:      String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            management: "https://management.azure.com".into(),
            login:      "https://login.microsoftonline.com".into(),
        }
    }
}

// ── Token provider ────────────────────────────────────────────────────────────

/// Abstraction over Azure token acquisition; swapped out in tests.
#[async_trait]
trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, FetchError>;
}

type TokenCache = Mutex<Option<(String, Instant)>>;

async fn cached(cache: &TokenCache) -> Option<String> {
    let guard = cache.lock().await;
    match guard.as_ref() {
        Some((tok, expiry)) if Instant::now() < *expiry => Some(tok.clone()),
        _ => None,
    }
}

async fn store(cache: &TokenCache, tok: &str, expires_in: u64) {
    let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));
    *cache.lock().await = Some((tok.to_string(), expiry));
}

// ── Service Principal ─────────────────────────────────────────────────────────

struct ServicePrincipalTokenProvider {
    tenant_id:     String,
    client_id:     String,
    client_secret: String,
    login_base:    String,
    client:        reqwest::Client,
    cache:         TokenCache,
}

#[async_trait]
impl TokenProvider for ServicePrincipalTokenProvider {
    async fn token(&self) -> Result<String, FetchError> {
        if let Some(tok) = cached(&self.cache).await {
            return Ok(tok);
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", "https://management.azure.com/.default"),
        ];
        let resp: Value = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| FetchError::Auth(format!("SP token request: {}", e)))?
            .json()
            .await
            .map_err(|e| FetchError::Auth(format!("SP token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| FetchError::Auth(format!("SP token: no access_token in response: {}", AzureFetcher::parse_arm_error(&resp))))?
            .to_string();
        let expires_in = resp["expires_in"].as_u64().unwrap_or(3600);

        store(&self.cache, &tok, expires_in).await;
        Ok(tok)
    }
}

// ── Managed Identity ──────────────────────────────────────────────────────────

/// App Service / Functions style managed identity (`IDENTITY_ENDPOINT` +
/// `IDENTITY_HEADER`), or the VM IMDS endpoint when no header is present.
struct ManagedIdentityTokenProvider {
    endpoint:        String,
    identity_header: Option<String>,
    client:          reqwest::Client,
    cache:           TokenCache,
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self) -> Result<String, FetchError> {
        if let Some(tok) = cached(&self.cache).await {
            return Ok(tok);
        }

        let mut req = self.client.get(&self.endpoint);
        req = match &self.identity_header {
            Some(h) => req
                .header("X-IDENTITY-HEADER", h)
                .query(&[("api-version", "2019-08-01")]),
            None => req
                .header("Metadata", "true")
                .query(&[("api-version", "2018-02-01")]),
        };
        let resp: Value = req
            .query(&[("resource", "https://management.azure.com/")])
            .send()
            .await
            .map_err(|e| FetchError::Auth(format!("managed identity token request: {}", e)))?
            .json()
            .await
            .map_err(|e| FetchError::Auth(format!("managed identity token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| FetchError::Auth(format!("managed identity token: no access_token: {}", AzureFetcher::parse_arm_error(&resp))))?
            .to_string();
        // IMDS returns expires_in as a string.
        let expires_in = resp["expires_in"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .or_else(|| resp["expires_in"].as_u64())
            .unwrap_or(3600);

        store(&self.cache, &tok, expires_in).await;
        Ok(tok)
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

struct AzureCliTokenProvider {
    tenant_id: Option<String>,
    cache:     TokenCache,
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn token(&self) -> Result<String, FetchError> {
        if let Some(tok) = cached(&self.cache).await {
            return Ok(tok);
        }

        let mut args = vec![
            "account",
            "get-access-token",
            "--resource",
            "https://management.azure.com",
            "--output",
            "json",
        ];
        if let Some(tenant) = self.tenant_id.as_deref() {
            args.extend(["--tenant", tenant]);
        }
        let output = StdCommand::new("az")
            .args(&args)
            .output()
            .map_err(|e| FetchError::Auth(format!("az CLI not found: {}. Install Azure CLI or configure service principal credentials.", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Auth(format!(
                "az account get-access-token failed: {}. Run 'az login' first.",
                stderr.trim()
            )));
        }

        let resp: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::Auth(format!("az CLI output parse: {}", e)))?;
        let tok = resp["accessToken"]
            .as_str()
            .ok_or_else(|| FetchError::Auth("az CLI: no accessToken in output".into()))?
            .to_string();
        // The CLI refreshes on its own; re-ask after a few minutes at most.
        store(&self.cache, &tok, 300).await;
        Ok(tok)
    }
}

// ── Static (tests) ────────────────────────────────────────────────────────────

pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, FetchError> {
        Ok(self.0.clone())
    }
}

// ── AzureFetcher ──────────────────────────────────────────────────────────────

pub struct AzureFetcher {
    config:     AzureFetcherConfig,
    client:     reqwest::Client,
    token:      Box<dyn TokenProvider>,
    base:       BaseUrls,
    role_names: Mutex<HashMap<String, Option<String>>>,
}

impl AzureFetcher {
    /// Create an `AzureFetcher`, auto-selecting the token provider:
    /// 1. `client_id` + `client_secret` in config → Service Principal
    /// 2. `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET` env vars → Service Principal
    /// 3. `IDENTITY_ENDPOINT` env var → Managed Identity
    /// 4. Otherwise → Azure CLI (`az account get-access-token`)
    pub fn new(config: AzureFetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Internal(format!("build HTTP client: {}", e)))?;
        let base = BaseUrls::default();

        let tenant = config
            .tenant_id
            .clone()
            .or_else(|| std::env::var("AZURE_TENANT_ID").ok());

        let sp_credentials = match (config.client_id.as_deref(), config.client_secret.as_deref()) {
            (Some(cid), Some(cs)) => Some((cid.to_string(), cs.to_string())),
            _ => match (std::env::var("AZURE_CLIENT_ID"), std::env::var("AZURE_CLIENT_SECRET")) {
                (Ok(cid), Ok(cs)) => Some((cid, cs)),
                _ => None,
            },
        };

        let token: Box<dyn TokenProvider> = if let Some((client_id, client_secret)) = sp_credentials {
            let tenant_id = tenant.ok_or_else(|| {
                FetchError::Auth("service principal credentials require a tenant id (--tenant-id or AZURE_TENANT_ID)".into())
            })?;
            info!(client_id = %client_id, "Using service principal credentials");
            Box::new(ServicePrincipalTokenProvider {
                tenant_id,
                client_id,
                client_secret,
                login_base: base.login.clone(),
                client:     client.clone(),
                cache:      Mutex::new(None),
            })
        } else if let Ok(endpoint) = std::env::var("IDENTITY_ENDPOINT") {
            info!("Using managed identity credentials");
            Box::new(ManagedIdentityTokenProvider {
                endpoint,
                identity_header: std::env::var("IDENTITY_HEADER").ok(),
                client:          client.clone(),
                cache:           Mutex::new(None),
            })
        } else {
            info!("Using Azure CLI credentials");
            Box::new(AzureCliTokenProvider {
                tenant_id: tenant,
                cache:     Mutex::new(None),
            })
        };

        Ok(Self::with_parts(config, client, token, base))
    }

    fn with_parts(
        config: AzureFetcherConfig,
        client: reqwest::Client,
        token: Box<dyn TokenProvider>,
        base: BaseUrls,
    ) -> Self {
        Self {
            config,
            client,
            token,
            base,
            role_names: Mutex::new(HashMap::new()),
        }
    }

    /// Create an `AzureFetcher` with a static bearer token and custom base URLs.
    /// Used exclusively in tests.
    #[cfg(test)]
    pub(crate) fn with_static_token(config: AzureFetcherConfig, token: &str, base: BaseUrls) -> Self {
        Self::with_parts(
            config,
            reqwest::Client::new(),
            Box::new(StaticToken(token.to_string())),
            base,
        )
    }

    async fn bearer(&self) -> Result<String, FetchError> {
        self.token.token().await
    }

    // ── ARM error parsing ─────────────────────────────────────────────────────

    fn parse_arm_error(body: &Value) -> String {
        let err = body
            .get("error")
            .or_else(|| body.get("Error"))
            .unwrap_or(body);
        let code    = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    // ── ARM HTTP ──────────────────────────────────────────────────────────────

    /// Returns the status and the raw body; decoding is the caller's call.
    async fn arm_get(&self, url: &str) -> Result<(u16, String), FetchError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    FetchError::Transient(format!("GET {}: {}", url, e))
                } else {
                    FetchError::Internal(format!("GET {}: {}", url, e))
                }
            })?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("GET {}: reading body: {}", url, e)))?;
        Ok((status, body))
    }

    /// GET that treats any non-2xx status as an error and requires a JSON
    /// body on success.
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let (status, text) = self.arm_get(url).await?;
        if (200..300).contains(&status) {
            return serde_json::from_str(&text)
                .map_err(|e| FetchError::Decode(format!("GET {}: body is not JSON: {}", url, e)));
        }
        // Error bodies from gateways are not always JSON.
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        debug!(url, status, "Azure ARM GET failed");
        Err(FetchError::from_status(
            status,
            format!("GET {}: {}", url, Self::parse_arm_error(&body)),
        ))
    }

    /// Follow `nextLink` until the listing is exhausted and return every
    /// element of every `value` array.
    async fn list_all(&self, first: String) -> Result<Vec<Value>, FetchError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(FetchError::Internal(format!(
                    "listing exceeded {} pages, last link: {}",
                    MAX_PAGES, url
                )));
            }
            let mut body = self.get_json(&url).await?;
            next = body["nextLink"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            match body.get_mut("value").map(Value::take) {
                Some(Value::Array(values)) => items.extend(values),
                None => {
                    return Err(FetchError::Decode(format!(
                        "GET {}: list response has no 'value' array",
                        url
                    )))
                }
                Some(other) => {
                    return Err(FetchError::Decode(format!(
                        "GET {}: 'value' is not an array: {}",
                        url, other
                    )))
                }
            }
            debug!(url, page = pages, total = items.len(), "fetched ARM list page");
        }
        Ok(items)
    }

    // ── Role definition names ─────────────────────────────────────────────────

    async fn role_name(&self, role_definition_id: &str) -> Option<String> {
        if let Some(hit) = self.role_names.lock().await.get(role_definition_id) {
            return hit.clone();
        }

        let url = format!(
            "{}{}?api-version={}",
            self.base.management, role_definition_id, AUTHORIZATION_API_VERSION,
        );
        let name = match self.get_json(&url).await {
            Ok(body) => body["properties"]["roleName"].as_str().map(str::to_string),
            Err(e) => {
                warn!(role_definition_id, error = %e, "could not resolve role definition name");
                None
            }
        };
        self.role_names
            .lock()
            .await
            .insert(role_definition_id.to_string(), name.clone());
        name
    }
}

// ── Response decoding ────────────────────────────────────────────────────────

fn decode_resource_group(name: &str, body: &Value) -> Result<ObservedResourceGroup, FetchError> {
    let id = body["id"]
        .as_str()
        .ok_or_else(|| FetchError::Decode(format!("resource group '{}': missing id", name)))?
        .to_string();
    let location = body["location"]
        .as_str()
        .ok_or_else(|| FetchError::Decode(format!("resource group '{}': missing location", name)))?
        .to_string();
    Ok(ObservedResourceGroup { id, location, tags: decode_tags(&body["tags"]) })
}

/// ARM tags are string-valued; anything else is rendered as JSON text.
fn decode_tags(tags: &Value) -> BTreeMap<String, String> {
    let Some(obj) = tags.as_object() else {
        return BTreeMap::new();
    };
    obj.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v.as_str() {
                Some(s) => s.to_string(),
                None => v.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn decode_lock(item: &Value) -> Result<ObservedLock, FetchError> {
    let name = item["name"].as_str().unwrap_or("").to_string();
    let raw_level = item["properties"]["level"]
        .as_str()
        .ok_or_else(|| FetchError::Decode(format!("lock '{}': missing properties.level", name)))?;
    let level = raw_level
        .parse::<LockLevel>()
        .map_err(|e| FetchError::Decode(format!("lock '{}': {}", name, e)))?;
    Ok(ObservedLock { name, level })
}

fn decode_role_assignment(item: &Value) -> Result<ObservedRoleBinding, FetchError> {
    let props = &item["properties"];
    let field = |key: &str| {
        props[key].as_str().map(str::to_string).ok_or_else(|| {
            FetchError::Decode(format!(
                "role assignment '{}': missing properties.{}",
                item["name"].as_str().unwrap_or(""),
                key
            ))
        })
    };
    Ok(ObservedRoleBinding {
        principal_id:       field("principalId")?,
        role_definition_id: field("roleDefinitionId")?,
        role_name:          None,
    })
}

// ── Fetcher impl ──────────────────────────────────────────────────────────────

#[async_trait]
impl Fetcher for AzureFetcher {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn fetch_resource_group(&self, name: &str) -> Result<ObservedResourceGroup, FetchError> {
        let url = format!(
            "{}/subscriptions/{}/resourcegroups/{}?api-version={}",
            self.base.management, self.config.subscription_id, name, RESOURCE_GROUP_API_VERSION,
        );
        let body = self.get_json(&url).await?;
        decode_resource_group(name, &body)
    }

    async fn fetch_locks(&self, resource_group: &str) -> Result<Vec<ObservedLock>, FetchError> {
        let url = format!(
            "{}{}/providers/Microsoft.Authorization/locks?api-version={}",
            self.base.management,
            self.config.subscription_id.resource_group_scope(resource_group),
            LOCKS_API_VERSION,
        );
        self.list_all(url)
            .await?
            .iter()
            .map(decode_lock)
            .collect()
    }

    async fn fetch_role_assignments(
        &self,
        scope: &str,
    ) -> Result<Vec<ObservedRoleBinding>, FetchError> {
        let url = format!(
            "{}{}/providers/Microsoft.Authorization/roleAssignments?api-version={}",
            self.base.management, scope, AUTHORIZATION_API_VERSION,
        );
        let mut bindings = self
            .list_all(url)
            .await?
            .iter()
            .map(decode_role_assignment)
            .collect::<Result<Vec<_>, _>>()?;

        if self.config.resolve_role_names {
            for binding in &mut bindings {
                binding.role_name = self.role_name(&binding.role_definition_id).await;
            }
        }
        Ok(bindings)
    }
}
