use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use crate::model::{UserContext, SYSTEM_USER_ID};

/// Axum extractor for UserContext from request headers
///
/// This extractor looks for user information in request headers:
/// - X-User-Id: Required user identifier
/// - X-User-Email: Optional user email
/// - X-User-Name: Optional user display name
/// - X-User-Roles: Optional comma-separated role list
///
/// Requests without an X-User-Id act as an anonymous caller with no roles.
/// The reserved system id is refused with 403.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let Some(user_id) = extract_header_value(headers, "x-user-id") else {
            return Ok(UserContext::anonymous());
        };
        if user_id.eq_ignore_ascii_case(SYSTEM_USER_ID) {
            log::warn!("Rejected request claiming the reserved user id '{}'", user_id);
            return Err(StatusCode::FORBIDDEN);
        }

        let user_email = extract_header_value(headers, "x-user-email");
        let user_name = extract_header_value(headers, "x-user-name");
        let roles = extract_header_value(headers, "x-user-roles")
            .map(|value| parse_roles(&value))
            .unwrap_or_default();

        Ok(UserContext::with_details(user_id, user_email, user_name).with_roles(roles))
    }
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_roles(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, Request};

    #[tokio::test]
    async fn test_user_context_extraction() {
        let request = Request::builder()
            .header("x-user-id", "test-user-123")
            .header("x-user-email", "test@example.com")
            .header("x-user-roles", "foreman, project_manager")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ctx = UserContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.user_id, "test-user-123");
        assert_eq!(ctx.user_email, Some("test@example.com".to_string()));
        assert_eq!(ctx.roles, vec!["foreman".to_string(), "project_manager".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_id_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-user-roles"),
            HeaderValue::from_static("admin"),
        );
        let mut request = Request::builder().body(()).unwrap();
        *request.headers_mut() = headers;
        let (mut parts, _) = request.into_parts();

        let ctx = UserContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx, UserContext::anonymous());
    }

    #[tokio::test]
    async fn test_system_id_is_refused() {
        for id in ["system", "System"] {
            let request = Request::builder()
                .header("x-user-id", id)
                .header("x-user-roles", "foreman")
                .body(())
                .unwrap();
            let (mut parts, _) = request.into_parts();

            let rejection = UserContext::from_request_parts(&mut parts, &())
                .await
                .unwrap_err();
            assert_eq!(rejection, StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn test_parse_roles() {
        assert_eq!(parse_roles(" admin ,,owner"), vec!["admin", "owner"]);
        assert!(parse_roles("").is_empty());
    }
}
