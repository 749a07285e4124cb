//! Request authentication middleware
//!
//! Reads `Authorization: Bearer <token>`, asks the configured
//! [`Authenticator`](super::Authenticator) for the user and stores the
//! resulting [`UserContext`] in the request extensions. A missing or
//! rejected credential leaves the request anonymous; whether that is
//! acceptable is decided later by the route's guard or extractor.

use crate::auth::provider::{SharedAuthenticator, bearer_token};
use crate::auth::user::UserContext;
use crate::error::http_mapper::ApiError;
use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use std::convert::Infallible;
use tracing::{debug, warn};

/// Attach the authenticated user, if any, to the request
pub async fn authenticate_request(
    State(authenticator): State<SharedAuthenticator>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    if let Some(token) = token {
        match authenticator.authenticate(&token).await {
            Ok(user) => {
                debug!(user_id = %user.id, "Authenticated request");
                req.extensions_mut().insert(user);
            }
            Err(e) if e.is_rejection() => {
                debug!(
                    error = %e,
                    method = authenticator.auth_type(),
                    "Credentials rejected, continuing anonymously"
                );
            }
            Err(e) => {
                warn!(
                    error = %e,
                    method = authenticator.auth_type(),
                    "Authentication unavailable, continuing anonymously"
                );
            }
        }
    }

    next.run(req).await
}

/// Extractor for handlers that need a caller; rejects anonymous requests with 401
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserContext);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "Unauthenticated",
                    "No authenticated user on request",
                )
            })
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<UserContext>().cloned().map(CurrentUser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenAuthenticator;
    use crate::store::{MemoryStore, UserStore};
    use crate::util::SecretString;
    use axum::Router;
    use axum::body::Body;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        store.create_user("a@example.com", false).await.unwrap();
        let authenticator: SharedAuthenticator = Arc::new(StaticTokenAuthenticator::new(
            vec![(SecretString::new("tok-a"), "a@example.com".into())],
            store,
        ));

        Router::new()
            .route(
                "/whoami",
                get(|user: Option<CurrentUser>| async move {
                    user.map(|CurrentUser(u)| u.email)
                        .unwrap_or_else(|| "anonymous".into())
                }),
            )
            .route(
                "/private",
                get(|CurrentUser(user): CurrentUser| async move { user.email }),
            )
            .layer(from_fn_with_state(authenticator, authenticate_request))
    }

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_attaches_user() {
        let response = app()
            .await
            .oneshot(request("/whoami", Some("Bearer tok-a")))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "a@example.com");
    }

    #[tokio::test]
    async fn test_invalid_token_stays_anonymous() {
        let response = app()
            .await
            .oneshot(request("/whoami", Some("Bearer wrong")))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "anonymous");
    }

    struct UnavailableAuthenticator;

    #[async_trait::async_trait]
    impl crate::auth::Authenticator for UnavailableAuthenticator {
        async fn authenticate(&self, _token: &str) -> Result<UserContext, crate::error::AuthError> {
            Err(crate::error::AuthError::Failed("store unavailable".into()))
        }

        fn auth_type(&self) -> &'static str {
            "unavailable"
        }
    }

    #[tokio::test]
    async fn test_authenticator_outage_fails_closed() {
        let authenticator: SharedAuthenticator = Arc::new(UnavailableAuthenticator);
        let router = Router::new()
            .route(
                "/private",
                get(|CurrentUser(user): CurrentUser| async move { user.email }),
            )
            .layer(from_fn_with_state(authenticator, authenticate_request));

        let response = router
            .oneshot(request("/private", Some("Bearer tok-a")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_current_user_rejects_anonymous() {
        let response = app().await.oneshot(request("/private", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
