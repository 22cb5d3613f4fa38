use forgedesk::notifications::push::{
    invalid_endpoints, EndpointStatus, FcmClient, PushMessage, PushTransport, TransportError,
};
use uuid::Uuid;

fn message<'a>(notification_id: &'a Uuid) -> PushMessage<'a> {
    PushMessage {
        title: "New Reply on Ticket #T-00004801",
        body: "Jane Support: Replacement shipped",
        ticket_id: "T-00004801",
        notification_id: *notification_id,
    }
}

#[tokio::test]
async fn per_endpoint_results_are_classified() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/fcm/send")
        .match_header("authorization", "key=test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"results":[{"message_id":"m-1"},{"error":"NotRegistered"},{"error":"Unavailable"}]}"#,
        )
        .create_async()
        .await;

    let client = FcmClient::new(format!("{}/fcm/send", server.url()), "test-key".to_string());
    let endpoints = ["tok-a", "tok-b", "tok-c"].map(String::from);
    let notification_id = Uuid::new_v4();

    let report = client
        .send(&endpoints, &message(&notification_id))
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report[0].status, EndpointStatus::Delivered);
    assert_eq!(report[1].status, EndpointStatus::Invalid);
    assert_eq!(report[2].status, EndpointStatus::Failed);
    assert_eq!(invalid_endpoints(&report), vec!["tok-b"]);

    mock.assert_async().await;
}

#[tokio::test]
async fn server_errors_surface_as_transport_failures() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/fcm/send")
        .with_status(500)
        .create_async()
        .await;

    let client = FcmClient::new(format!("{}/fcm/send", server.url()), "test-key".to_string());
    let endpoints = ["tok-a"].map(String::from);
    let notification_id = Uuid::new_v4();

    let err = client
        .send(&endpoints, &message(&notification_id))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Request(_)));
}

#[tokio::test]
async fn result_count_mismatch_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/fcm/send")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results":[{"message_id":"m-1"}]}"#)
        .create_async()
        .await;

    let client = FcmClient::new(format!("{}/fcm/send", server.url()), "test-key".to_string());
    let endpoints = ["tok-a", "tok-b"].map(String::from);
    let notification_id = Uuid::new_v4();

    let err = client
        .send(&endpoints, &message(&notification_id))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Response(_)));
}
