use super::*;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::providers::http_client::{SharedClientKind, client_for_ctx};
use crate::providers::oauth_common::{parse_query_value, resolve_manual_code_and_state};

struct OAuthState {
    code_verifier: String,
    redirect_uri: String,
    created_at: Instant,
}

static OAUTH_STATES: OnceLock<Mutex<HashMap<String, OAuthState>>> = OnceLock::new();

pub(super) fn oauth_start(
    _ctx: &UpstreamCtx,
    _config: &ProviderConfig,
    req: &OAuthStartRequest,
) -> ProviderResult<UpstreamHttpResponse> {
    let redirect_uri = parse_query_value(req.query.as_deref(), "redirect_uri")
        .unwrap_or_else(|| "urn:ietf:wg:oauth:2.0:oob".to_string());
    let scope =
        parse_query_value(req.query.as_deref(), "scope").unwrap_or_else(|| OAUTH_SCOPE.to_string());

    let (state_id, code_verifier, code_challenge) = generate_state_and_pkce();
    let auth_url = build_authorize_url(&redirect_uri, &code_challenge, &state_id, &scope);

    let mut guard = oauth_states()
        .lock()
        .map_err(|_| ProviderError::Other("oauth state lock failed".to_string()))?;
    prune_oauth_states(&mut guard);
    guard.insert(
        state_id.clone(),
        OAuthState {
            code_verifier,
            redirect_uri: redirect_uri.clone(),
            created_at: Instant::now(),
        },
    );

    Ok(json_response(serde_json::json!({
        "auth_url": auth_url,
        "state": state_id,
        "redirect_uri": redirect_uri,
        "mode": "manual",
        "instructions": "Open auth_url, then submit code (or callback_url) to /oauth/callback.",
    })))
}

pub(super) fn oauth_callback(
    ctx: &UpstreamCtx,
    _config: &ProviderConfig,
    req: &OAuthCallbackRequest,
) -> ProviderResult<OAuthCallbackResult> {
    if let Some(error) = parse_query_value(req.query.as_deref(), "error") {
        let detail = parse_query_value(req.query.as_deref(), "error_description").unwrap_or(error);
        return Ok(OAuthCallbackResult {
            response: json_error(400, &detail),
            credential: None,
        });
    }

    let (code, state_param) = match resolve_manual_code_and_state(req.query.as_deref()) {
        Ok(v) => v,
        Err(msg) => {
            return Ok(OAuthCallbackResult {
                response: json_error(400, msg),
                credential: None,
            });
        }
    };

    let (oauth_state, resolved_state, ambiguous_state) = {
        let mut guard = oauth_states()
            .lock()
            .map_err(|_| ProviderError::Other("oauth state lock failed".to_string()))?;
        prune_oauth_states(&mut guard);
        if let Some(state_id) = state_param.clone() {
            (guard.remove(&state_id), Some(state_id), false)
        } else if guard.len() == 1 {
            let key = guard.keys().next().cloned();
            let state = key.as_ref().and_then(|state_id| guard.remove(state_id));
            (state, key, false)
        } else {
            (None, None, !guard.is_empty())
        }
    };
    if ambiguous_state {
        return Ok(OAuthCallbackResult {
            response: json_error(400, "ambiguous_state"),
            credential: None,
        });
    }
    let Some(oauth_state) = oauth_state else {
        return Ok(OAuthCallbackResult {
            response: json_error(400, "missing state"),
            credential: None,
        });
    };

    let tokens = exchange_code_for_tokens(ctx, &oauth_state.redirect_uri, &oauth_state.code_verifier, &code)?;
    let Some(refresh_token) = tokens.refresh_token.clone() else {
        return Ok(OAuthCallbackResult {
            response: json_error(400, "missing refresh_token"),
            credential: None,
        });
    };
    let expires_at = tokens.expires_in.map(|v| v + chrono_now()).unwrap_or(0);

    let project_id = detect_project_id(&tokens.access_token, DEFAULT_BASE_URL)
        .ok()
        .flatten()
        .unwrap_or_default();

    let credential = OAuthCredential {
        name: None,
        settings_json: None,
        credential: Credential::GeminiCli(GeminiCliCredential {
            access_token: tokens.access_token.clone(),
            refresh_token,
            expires_at,
            project_id,
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
            user_email: None,
        }),
    };

    Ok(OAuthCallbackResult {
        response: json_response(serde_json::json!({
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
            "expires_in": tokens.expires_in,
        })),
        credential: Some(credential),
    })
}

pub(super) fn on_auth_failure<'a>(
    ctx: &'a UpstreamCtx,
    _config: &'a ProviderConfig,
    credential: &'a Credential,
    _req: &'a Request,
    _failure: &'a meridian_provider_core::provider::UpstreamFailure,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ProviderResult<AuthRetryAction>> + Send + 'a>>
{
    Box::pin(async move {
        let Credential::GeminiCli(cred) = credential else {
            return Ok(AuthRetryAction::None);
        };
        if cred.refresh_token.trim().is_empty() {
            return Ok(AuthRetryAction::None);
        }
        let tokens = refresh_access_token(ctx, &cred.refresh_token, &cred.client_id, &cred.client_secret)?;
        let mut updated = credential.clone();
        if let Credential::GeminiCli(cred_mut) = &mut updated {
            cred_mut.access_token = tokens.access_token.clone();
            if let Some(refresh_token) = tokens.refresh_token.clone() {
                cred_mut.refresh_token = refresh_token;
            }
            cred_mut.expires_at = tokens
                .expires_in
                .map(|v| v + chrono_now())
                .unwrap_or(cred_mut.expires_at);
            return Ok(AuthRetryAction::UpdateCredential(Box::new(updated)));
        }
        Ok(AuthRetryAction::None)
    })
}

pub(super) async fn enrich_credential_profile_if_missing(
    _config: &ProviderConfig,
    credential: &Credential,
) -> ProviderResult<Option<Credential>> {
    // The Google token endpoint does not return profile data alongside the
    // token response; callers that need an email already resolved it during
    // onboarding, so there is nothing to backfill here.
    let Credential::GeminiCli(_) = credential else {
        return Ok(None);
    };
    Ok(None)
}

fn oauth_states() -> &'static Mutex<HashMap<String, OAuthState>> {
    OAUTH_STATES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn prune_oauth_states(states: &mut HashMap<String, OAuthState>) {
    let now = Instant::now();
    states.retain(|_, state| {
        now.duration_since(state.created_at) < Duration::from_secs(OAUTH_STATE_TTL_SECS)
    });
}

fn generate_state_and_pkce() -> (String, String, String) {
    let mut state_bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut state_bytes);
    let state = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(state_bytes);

    let mut verifier_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut verifier_bytes);
    let code_verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(verifier_bytes);
    let digest = Sha256::digest(code_verifier.as_bytes());
    let code_challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
    (state, code_verifier, code_challenge)
}

fn build_authorize_url(redirect_uri: &str, code_challenge: &str, state: &str, scope: &str) -> String {
    let qs = format!(
        "client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&code_challenge={}&code_challenge_method=S256&state={}",
        urlencoding::encode(CLIENT_ID),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(scope),
        urlencoding::encode(code_challenge),
        urlencoding::encode(state),
    );
    format!("{}?{qs}", DEFAULT_AUTH_URL)
}

fn exchange_code_for_tokens(
    ctx: &UpstreamCtx,
    redirect_uri: &str,
    code_verifier: &str,
    code: &str,
) -> ProviderResult<TokenResponse> {
    let cleaned_code = code.split('#').next().unwrap_or(code);
    let cleaned_code = cleaned_code.split('&').next().unwrap_or(cleaned_code);
    let body = format!(
        "grant_type=authorization_code&client_id={}&client_secret={}&code={}&redirect_uri={}&code_verifier={}",
        urlencoding::encode(CLIENT_ID),
        urlencoding::encode(CLIENT_SECRET),
        urlencoding::encode(cleaned_code),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(code_verifier),
    );
    crate::providers::oauth_common::block_on(async move {
        let client = client_for_ctx(ctx, SharedClientKind::Global)?;
        let resp = client
            .post(DEFAULT_TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(ProviderError::Other(format!(
                "oauth_token_failed: {status} {text}"
            )));
        }
        serde_json::from_slice::<TokenResponse>(&bytes)
            .map_err(|err| ProviderError::Other(err.to_string()))
    })
}

fn refresh_access_token(
    ctx: &UpstreamCtx,
    refresh_token: &str,
    client_id: &str,
    client_secret: &str,
) -> ProviderResult<TokenResponse> {
    let body = format!(
        "grant_type=refresh_token&client_id={}&client_secret={}&refresh_token={}",
        urlencoding::encode(client_id),
        urlencoding::encode(client_secret),
        urlencoding::encode(refresh_token),
    );
    crate::providers::oauth_common::block_on(async move {
        let client = client_for_ctx(ctx, SharedClientKind::Global)?;
        let resp = client
            .post(DEFAULT_TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(ProviderError::Other(format!(
                "refresh_token_failed: {status} {text}"
            )));
        }
        serde_json::from_slice::<TokenResponse>(&bytes)
            .map_err(|err| ProviderError::Other(err.to_string()))
    })
}
