//! Issuer key download over real HTTP.

mod support;

use std::thread;

use shc_validator::{validate, Artifact, ErrorCode, FileInfo, FileType, ValidationContext};
use support::*;
use tiny_http::{Header, Response, Server};

/// Serves `body` for the first request and returns the base URL and the
/// path that was requested.
fn serve_once(body: String) -> (String, thread::JoinHandle<String>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let handle = thread::spawn(move || {
        let request = server.recv().unwrap();
        let path = request.url().to_string();
        let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
        request
            .respond(Response::from_string(body).with_header(header))
            .unwrap();
        path
    });
    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn keys_are_downloaded_from_well_known_path() {
    let key = signing_key(40);
    let (iss, handle) = serve_once(key_set(&[&key]).to_string());
    let ctx = ValidationContext::new(config()).unwrap();

    let files = [FileInfo::from_text("card.jws", health_card_jws(&key, &iss))];
    let result = validate(&ctx, FileType::Jws, &files).await;
    let requested = handle.join().unwrap();

    assert_eq!(requested, "/.well-known/jwks.json");
    let Some(Artifact::Token(token)) = &result.result else {
        panic!("expected a token");
    };
    assert!(token.signature_verified());
    // plain http issuers are flagged but still usable
    assert!(result.log.has_code(ErrorCode::InvalidIssuerUrl));
    assert!(!result.log.has_code(ErrorCode::IssuerKeyDownloadError));
    assert_eq!(ctx.keys.len(), 1);
}

#[tokio::test]
async fn refused_connection_is_download_error() {
    let key = signing_key(41);
    // bind then drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let iss = format!("http://127.0.0.1:{}", port);
    let ctx = ValidationContext::new(config()).unwrap();

    let files = [FileInfo::from_text("card.jws", health_card_jws(&key, &iss))];
    let result = validate(&ctx, FileType::Jws, &files).await;

    assert!(result.log.has_code(ErrorCode::IssuerKeyDownloadError));
    assert!(result.log.has_code(ErrorCode::JwsVerificationError));
    assert!(result.result.is_some());
}
