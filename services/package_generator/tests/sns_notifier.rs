//! Integration tests for the SNS completion notifier against a mock endpoint.

use aws_sdk_sns::config::{BehaviorVersion, Credentials, Region};
use chrono::{TimeZone, Utc};
use conversation_package_core::domain::{GeneratedPackage, Notes, Package};
use conversation_package_core::ports::{CompletionNotifier, PortError};
use package_generator_lib::adapters::SnsCompletionNotifier;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOPIC_ARN: &str = "arn:aws:sns:us-east-1:000000000000:package-generated";

fn create_test_notifier(mock_server: &MockServer) -> SnsCompletionNotifier {
    let config = aws_sdk_sns::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("test", "test", None, None, "test"))
        .endpoint_url(mock_server.uri())
        .build();
    SnsCompletionNotifier::new(aws_sdk_sns::Client::from_conf(config), TOPIC_ARN.to_string())
}

fn package() -> Package {
    let generated = GeneratedPackage {
        name: "Spanish for nurses".to_string(),
        description: String::new(),
        category: "language".to_string(),
        tags: vec!["spanish".to_string()],
        conversations: Vec::new(),
        notes: Notes::default(),
    };
    let at = Utc.with_ymd_and_hms(2026, 6, 1, 8, 15, 0).unwrap();
    Package::create("user-7", "spanish", "Spanish", generated, at)
}

#[tokio::test]
async fn test_publishes_to_topic() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=Publish"))
        .and(body_string_contains("package-generated"))
        .and(body_string_contains("Subject=Package"))
        .and(body_string_contains("userId"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<PublishResponse xmlns="http://sns.amazonaws.com/doc/2010-03-31/">
  <PublishResult><MessageId>5f8d1f0c-1b7e-4a59-9c3e-7d0c1b2a3e4f</MessageId></PublishResult>
  <ResponseMetadata><RequestId>f187a3c1-376f-11df-8963-01868b7c937a</RequestId></ResponseMetadata>
</PublishResponse>"#,
            "text/xml",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = create_test_notifier(&mock_server);
    notifier
        .notify(&package(), false)
        .await
        .expect("publish succeeds");
}

#[tokio::test]
async fn test_rejected_publish_is_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_raw(
            r#"<ErrorResponse xmlns="http://sns.amazonaws.com/doc/2010-03-31/">
  <Error><Type>Sender</Type><Code>NotFound</Code><Message>Topic does not exist</Message></Error>
  <RequestId>9dd01905-5012-5f99-8663-4b3ecd0dfaef</RequestId>
</ErrorResponse>"#,
            "text/xml",
        ))
        .mount(&mock_server)
        .await;

    let notifier = create_test_notifier(&mock_server);
    let result = notifier.notify(&package(), true).await;

    assert!(
        matches!(result, Err(PortError::Unexpected(_))),
        "Expected publish error, got: {:?}",
        result
    );
}
