//! Tests for the Web API client against a mock server.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tandem::{
    config::Config,
    error::{ErrorKind, Result},
    remote::{Offset, PlayRequest, RemoteApi, WebApi},
    state::{DeviceId, DeviceType},
    token::{AccessToken, TokenProvider},
};

const PLAYER: &str = "/v1/me/player";

#[derive(Default)]
struct CountingToken {
    flushes: AtomicUsize,
}

#[async_trait]
impl TokenProvider for CountingToken {
    async fn access_token(&self) -> Result<AccessToken> {
        AccessToken::new("token")
    }

    fn flush_token(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

async fn setup() -> (MockServer, WebApi, Arc<CountingToken>) {
    let server = MockServer::start().await;
    let config = Config {
        api_url: format!("{}{PLAYER}", server.uri()).parse().unwrap(),
        ..Config::default()
    };

    let tokens = Arc::new(CountingToken::default());
    let api = WebApi::new(&config, tokens.clone()).unwrap();
    (server, api, tokens)
}

fn error_body(status: u16, message: &str, reason: Option<&str>) -> serde_json::Value {
    json!({ "error": { "status": status, "message": message, "reason": reason } })
}

mod playback_state {
    use super::*;

    #[tokio::test]
    async fn decodes_the_snapshot() {
        let (server, api, _) = setup().await;

        Mock::given(method("GET"))
            .and(path(PLAYER))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device": {
                    "id": "A",
                    "is_active": true,
                    "name": "Kitchen",
                    "type": "Speaker",
                    "volume_percent": 30
                },
                "shuffle_state": true,
                "timestamp": 1700000000000_u64,
                "progress_ms": 5000,
                "is_playing": true,
                "item": {
                    "uri": "spotify:track:1",
                    "name": "Song",
                    "duration_ms": 200000,
                    "artists": [{ "name": "Band" }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = api.playback_state().await.unwrap().unwrap();
        assert_eq!(snapshot.device_id(), Some(&DeviceId::from("A")));
        assert_eq!(snapshot.device.kind, DeviceType::Speaker);
        assert_eq!(snapshot.progress, Duration::from_millis(5000));
        assert_eq!(snapshot.duration(), Duration::from_millis(200_000));
        assert!(snapshot.shuffle_state);
    }

    #[tokio::test]
    async fn no_content_means_nothing_playing() {
        let (server, api, _) = setup().await;

        Mock::given(method("GET"))
            .and(path(PLAYER))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(api.playback_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unauthorized_flushes_the_token() {
        let (server, api, tokens) = setup().await;

        Mock::given(method("GET"))
            .and(path(PLAYER))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(error_body(401, "The access token expired", None)),
            )
            .mount(&server)
            .await;

        let err = api.playback_state().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
        assert_eq!(tokens.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn html_error_pages_are_still_categorized() {
        let (server, api, _) = setup().await;

        Mock::given(method("GET"))
            .and(path(PLAYER))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
            .mount(&server)
            .await;

        let err = api.playback_state().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
    }
}

mod error_mapping {
    use super::*;

    async fn volume_error(status: u16, reason: Option<&str>) -> tandem::error::Error {
        let (server, api, _) = setup().await;

        Mock::given(method("PUT"))
            .and(path(format!("{PLAYER}/volume")))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(error_body(status, "nope", reason)),
            )
            .mount(&server)
            .await;

        api.set_volume(None, 10).await.unwrap_err()
    }

    #[tokio::test]
    async fn no_active_device() {
        let err = volume_error(404, Some("NO_ACTIVE_DEVICE")).await;
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
        assert!(err.is_no_active_device());
        assert_eq!(err.reason(), Some("NO_ACTIVE_DEVICE"));
    }

    #[tokio::test]
    async fn other_not_found() {
        let err = volume_error(404, None).await;
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!err.is_no_active_device());
    }

    #[tokio::test]
    async fn premium_required() {
        let err = volume_error(403, Some("PREMIUM_REQUIRED")).await;
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn rate_limited() {
        let err = volume_error(429, None).await;
        assert_eq!(err.kind, ErrorKind::ResourceExhausted);
    }

    #[tokio::test]
    async fn bad_request() {
        let err = volume_error(400, None).await;
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}

mod commands {
    use super::*;

    #[tokio::test]
    async fn set_volume_uses_query_parameters() {
        let (server, api, _) = setup().await;

        Mock::given(method("PUT"))
            .and(path(format!("{PLAYER}/volume")))
            .and(query_param("volume_percent", "50"))
            .and(query_param("device_id", "dev"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        api.set_volume(Some(&DeviceId::from("dev")), 50).await.unwrap();
    }

    #[tokio::test]
    async fn set_shuffle_uses_query_parameters() {
        let (server, api, _) = setup().await;

        Mock::given(method("PUT"))
            .and(path(format!("{PLAYER}/shuffle")))
            .and(query_param("state", "true"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        api.set_shuffle(None, true).await.unwrap();
    }

    #[tokio::test]
    async fn pause_targets_the_device() {
        let (server, api, _) = setup().await;

        Mock::given(method("PUT"))
            .and(path(format!("{PLAYER}/pause")))
            .and(query_param("device_id", "dev"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        api.pause(Some(&DeviceId::from("dev"))).await.unwrap();
    }

    #[tokio::test]
    async fn play_sends_the_context() {
        let (server, api, _) = setup().await;

        Mock::given(method("PUT"))
            .and(path(format!("{PLAYER}/play")))
            .and(query_param("device_id", "dev"))
            .and(body_json(json!({
                "context_uri": "spotify:album:1",
                "offset": { "position": 2 },
                "position_ms": 1500
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        api.play(PlayRequest {
            device_id: Some(DeviceId::from("dev")),
            context_uri: Some("spotify:album:1".to_string()),
            offset: Some(Offset::Position(2)),
            position: Some(Duration::from_millis(1500)),
            ..PlayRequest::default()
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn resume_sends_an_empty_body() {
        let (server, api, _) = setup().await;

        Mock::given(method("PUT"))
            .and(path(format!("{PLAYER}/play")))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        api.play(PlayRequest::default()).await.unwrap();
    }

    #[tokio::test]
    async fn transfer_names_the_device() {
        let (server, api, _) = setup().await;

        Mock::given(method("PUT"))
            .and(path(PLAYER))
            .and(body_json(json!({ "device_ids": ["dev"], "play": true })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        api.transfer_playback(&DeviceId::from("dev"), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn devices_are_listed() {
        let (server, api, _) = setup().await;

        Mock::given(method("GET"))
            .and(path(format!("{PLAYER}/devices")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "devices": [
                    { "id": "A", "is_active": true, "name": "Kitchen", "type": "Speaker", "volume_percent": 30 },
                    { "id": null, "is_active": false, "name": "Restricted", "type": "CastAudio" }
                ]
            })))
            .mount(&server)
            .await;

        let devices = api.devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, Some(DeviceId::from("A")));
        assert!(devices[1].id.is_none());
        assert_eq!(devices[1].kind, DeviceType::Other("CastAudio".to_string()));
    }
}
