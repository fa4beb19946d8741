use super::{ApiError, ApiResult};

use atpkg::npm::validate_legacy_name;
use atpkg::Registry;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::borrow::Cow;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// A package request, decoded from the request path.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct PackagePath {
    pub package: String,
    pub version: Option<String>,
}

/// Splits `/<pkg>[/<version>]` where a scoped `<pkg>` may span two segments
/// (`/@scope/name`) or one with an encoded slash (`/@scope%2fname`).
pub(super) fn parse_path(path: &str) -> Option<PackagePath> {
    let mut parts = path
        .split('/')
        .skip(1)
        .map(|part| urlencoding::decode(part).map(Cow::into_owned))
        .collect::<Result<VecDeque<_>, _>>()
        .ok()?;

    let mut package = parts.pop_front()?;
    if package.starts_with('@') && !package.contains('/') {
        let name = parts.pop_front().filter(|name| !name.is_empty())?;
        package = format!("{package}/{name}");
    }
    validate_legacy_name(&package).ok()?;

    let version = parts.pop_front().filter(|version| !version.is_empty());
    Some(PackagePath { package, version })
}

fn allow(method: &Method) -> Option<ApiResult<Response>> {
    match *method {
        Method::GET => None,
        Method::OPTIONS => Some(Ok(StatusCode::NO_CONTENT.into_response())),
        _ => Some(Err(ApiError::MethodNotAllowed)),
    }
}

/// GET /
pub(super) async fn root(method: Method) -> ApiResult<Response> {
    if let Some(refused) = allow(&method) {
        return refused;
    }
    Ok(Json(serde_json::json!({})).into_response())
}

/// GET /<pkg> and GET /<pkg>/<version-or-tag>
pub(super) async fn package(
    State(registry): State<Registry>,
    method: Method,
    uri: Uri,
) -> ApiResult<Response> {
    if let Some(refused) = allow(&method) {
        return refused;
    }
    let PackagePath { package, version } = parse_path(uri.path()).ok_or(ApiError::NotFound)?;

    // fires when the client goes away and this future is dropped
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let response = match version {
        Some(version) => {
            let version = registry.fetch_version(&package, &version, &cancel).await?;
            Json(version).into_response()
        }
        None => Json(registry.fetch_packument_with(&package, &cancel).await?).into_response(),
    };
    Ok(response)
}
