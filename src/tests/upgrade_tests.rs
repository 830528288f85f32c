use super::mock::*;
use crate::hash::digest_hex;
use crate::storage::FlashError;
use crate::{DownloadProgress, ErrorKind, UpgradeState};

fn download(image: &[u8]) -> Response {
    Response::ok(image.to_vec())
}

fn run(client: &mut TestClient) -> (Result<(), crate::OtaError>, Vec<DownloadProgress>) {
    let mut reports = Vec::new();
    let result = client.upgrade(|p| reports.push(p));
    (result, reports)
}

#[test]
fn test_upgrade_without_task_touches_nothing() {
    let connector = MockConnector::new();
    let mut client = client_with(&connector, MockWriter::default());

    let (result, reports) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::NoTask);
    assert!(reports.is_empty());
    assert_eq!(connector.created(), 0);
    assert_eq!(client.writer().target_requests, 0);
    assert_eq!(client.writer().begins, 0);
    assert_eq!(client.last_upgrade_state(), UpgradeState::Failed(ErrorKind::NoTask));
}

#[test]
fn test_upgrade_end_to_end() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(download(&image));

    let (result, reports) = run(&mut client);
    result.unwrap();

    let writer = client.writer();
    assert_eq!(writer.written.len(), 1024);
    assert_eq!(writer.written, image);
    assert_eq!(writer.begins, 1);
    assert_eq!(writer.finalized, 1);
    assert_eq!(writer.aborted, 0);
    assert_eq!(writer.boot_set, vec![1]);
    assert_eq!(client.last_upgrade_state(), UpgradeState::Done);
    assert_eq!(reports.last().map(|p| p.percent), Some(100));

    let app = client.incoming_app().unwrap();
    assert_eq!(app.version, "1.2.0");
    assert!(app.header_valid);

    let req = connector.requests().pop().unwrap();
    assert_eq!(req.url, format!("{}/prod/dev/42/download", BASE));
    assert_eq!(req.header("Authorization"), Some("version=2022-05-01&sign=abc"));
    assert_eq!(connector.created(), connector.closed());
}

#[test]
fn test_declared_length_mismatch() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(Response {
        content_length: Some(1000),
        ..download(&image)
    });

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::SizeMismatch);
    assert_eq!(client.writer().begins, 0);
    assert!(client.writer().written.is_empty());
    assert!(client.writer().boot_set.is_empty());
}

#[test]
fn test_missing_content_length() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(Response {
        content_length: None,
        ..download(&image)
    });

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::SizeMismatch);
    assert!(client.writer().written.is_empty());
}

#[test]
fn test_zero_declared_size_is_rejected() {
    let connector = MockConnector::new();
    connector.push(Response::json(r#"{"code":0,"data":{"tid":"9","md5":"d41d8cd98f00b204e9800998ecf8427e"}}"#));
    let mut client = client_with(&connector, MockWriter::default());
    client.check_task().unwrap();
    connector.push(download(&[]));

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::SizeMismatch);
}

#[test]
fn test_single_bit_corruption() {
    let image = firmware();
    let mut corrupted = image.clone();
    corrupted[700] ^= 0x04;

    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(download(&corrupted));

    let (result, _) = run(&mut client);
    match result.unwrap_err() {
        crate::OtaError::Integrity { expected, actual } => {
            assert_eq!(expected, digest_hex(&image));
            assert_eq!(actual, digest_hex(&corrupted));
        }
        other => panic!("unexpected error {:?}", other),
    }
    let writer = client.writer();
    assert!(writer.boot_set.is_empty());
    assert_eq!(writer.finalized, 0);
    assert_eq!(writer.aborted, 1);
    assert_eq!(client.last_upgrade_state(), UpgradeState::Failed(ErrorKind::Integrity));
}

#[test]
fn test_expected_digest_case_is_ignored() {
    let image = firmware();
    let connector = MockConnector::new();
    connector.push(Response::json(
        &task_json(&image).replace(&digest_hex(&image), &digest_hex(&image).to_uppercase()),
    ));
    let mut client = client_with(&connector, MockWriter::default());
    client.check_task().unwrap();
    connector.push(download(&image));

    let (result, _) = run(&mut client);
    result.unwrap();
    assert_eq!(client.writer().boot_set, vec![1]);
}

#[test]
fn test_progress_is_monotonic_and_complete() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(Response {
        read_size: 100,
        ..download(&image)
    });

    let (result, reports) = run(&mut client);
    result.unwrap();

    // 300ms per clock reading and 1s interval: several mid-stream reports
    assert!(reports.len() > 2, "only {} reports", reports.len());
    assert!(reports.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(reports.last().unwrap().percent, 100);
    let total: usize = reports.iter().map(|p| p.recent_bytes).sum();
    assert_eq!(total, 1024);
}

#[test]
fn test_small_reads_are_gated_until_header_region() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(Response {
        read_size: 100,
        ..download(&image)
    });

    let (result, _) = run(&mut client);
    result.unwrap();

    let writer = client.writer();
    // 3 reads of 100 bytes open the gate, the buffered prefix goes out in one write
    assert_eq!(writer.writes[0], 300);
    assert!(writer.writes[1..].iter().all(|&n| n <= 100));
    assert_eq!(writer.written, image);
}

#[test]
fn test_read_error_after_gate_aborts() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(Response {
        fail_at: Some(600),
        ..download(&image)
    });

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
    let writer = client.writer();
    assert_eq!(writer.begins, 1);
    assert_eq!(writer.aborted, 1);
    assert_eq!(writer.finalized, 0);
    assert!(writer.boot_set.is_empty());
    assert_eq!(connector.created(), connector.closed());
}

#[test]
fn test_read_error_inside_header() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(Response {
        read_size: 64,
        fail_at: Some(128),
        ..download(&image)
    });

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
    assert_eq!(client.writer().begins, 0);
    assert_eq!(client.writer().aborted, 0);
    assert_eq!(
        client.last_upgrade_state(),
        UpgradeState::Failed(ErrorKind::Transport)
    );
}

#[test]
fn test_download_status_error() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(Response::status(404));

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
    assert_eq!(client.writer().begins, 0);
}

#[test]
fn test_no_update_partition() {
    let image = firmware();
    let connector = MockConnector::new();
    let writer = MockWriter {
        no_target: true,
        ..MockWriter::default()
    };
    let mut client = client_with_task(&connector, writer, &image);
    let sessions = connector.created();

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::StorageUnavailable);
    assert_eq!(connector.created(), sessions);
}

#[test]
fn test_begin_failure() {
    let image = firmware();
    let connector = MockConnector::new();
    let writer = MockWriter {
        fail_begin: true,
        ..MockWriter::default()
    };
    let mut client = client_with_task(&connector, writer, &image);
    connector.push(download(&image));

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Storage);
    assert_eq!(client.writer().aborted, 0);
    assert!(client.writer().written.is_empty());
}

#[test]
fn test_write_failure_aborts() {
    let image = firmware();
    let connector = MockConnector::new();
    let writer = MockWriter {
        fail_write_after: Some(800),
        ..MockWriter::default()
    };
    let mut client = client_with_task(&connector, writer, &image);
    connector.push(download(&image));

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Storage);
    assert_eq!(client.writer().aborted, 1);
    assert!(client.writer().boot_set.is_empty());
}

#[test]
fn test_validation_failure_is_distinct() {
    let image = firmware();
    let connector = MockConnector::new();
    let writer = MockWriter {
        finalize_error: Some(FlashError::ValidateFailed),
        ..MockWriter::default()
    };
    let mut client = client_with_task(&connector, writer, &image);
    connector.push(download(&image));

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::ValidateFailed);
    let writer = client.writer();
    assert_eq!(writer.finalized, 1);
    // the handle went to finalize, so there is nothing left to abort
    assert_eq!(writer.aborted, 0);
    assert!(writer.boot_set.is_empty());
}

#[test]
fn test_finalize_driver_error() {
    let image = firmware();
    let connector = MockConnector::new();
    let writer = MockWriter {
        finalize_error: Some(FlashError::Driver("ESP_FAIL".to_string())),
        ..MockWriter::default()
    };
    let mut client = client_with_task(&connector, writer, &image);
    connector.push(download(&image));

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Storage);
    assert!(client.writer().boot_set.is_empty());
}

#[test]
fn test_set_boot_failure() {
    let image = firmware();
    let connector = MockConnector::new();
    let writer = MockWriter {
        fail_boot: true,
        ..MockWriter::default()
    };
    let mut client = client_with_task(&connector, writer, &image);
    connector.push(download(&image));

    let (result, _) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Storage);
    assert_eq!(client.writer().finalized, 1);
    assert_eq!(
        client.last_upgrade_state(),
        UpgradeState::Failed(ErrorKind::Storage)
    );
}

#[test]
fn test_image_shorter_than_header() {
    let image = vec![0xE9u8; 200];
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(download(&image));

    let (result, reports) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Storage);
    assert_eq!(client.writer().begins, 0);
    assert_eq!(reports.last().unwrap().percent, 100);
}

#[test]
fn test_upgrade_without_task_id() {
    let image = firmware();
    let connector = MockConnector::new();
    connector.push(Response::json(&format!(
        r#"{{"code":0,"data":{{"target":"1.2.0","size":{},"md5":"{}"}}}}"#,
        image.len(),
        digest_hex(&image)
    )));
    let mut client = client_with(&connector, MockWriter::default());
    assert!(client.check_task().unwrap().available);
    let sessions = connector.created();
    connector.push(download(&image));

    let (result, reports) = run(&mut client);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::NoTask);
    assert!(reports.is_empty());
    assert_eq!(connector.created(), sessions);
    assert_eq!(client.writer().target_requests, 0);
    assert!(client.writer().boot_set.is_empty());
    assert_eq!(client.last_upgrade_state(), UpgradeState::Failed(ErrorKind::NoTask));
}

#[test]
fn test_oversized_intervals_do_not_overflow() {
    let image = firmware();
    let connector = MockConnector::new();
    connector.push(Response::json(&task_json(&image)));
    let config = crate::OtaConfig {
        progress_interval_ms: u64::MAX,
        chunk_size: usize::MAX,
        ..test_config()
    };
    let mut client = client_with_config(&connector, MockWriter::default(), config);
    client.check_task().unwrap();
    connector.push(download(&image));

    let (result, reports) = run(&mut client);
    result.unwrap();
    // the interval never elapses, so only the end of stream reports
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].percent, 100);
    assert_eq!(client.writer().written, image);
}

#[test]
fn test_upgrade_without_progress_callback() {
    let image = firmware();
    let connector = MockConnector::new();
    let mut client = client_with_task(&connector, MockWriter::default(), &image);
    connector.push(download(&image));

    client.upgrade(|_| {}).unwrap();
    assert_eq!(client.writer().boot_set, vec![1]);
}
