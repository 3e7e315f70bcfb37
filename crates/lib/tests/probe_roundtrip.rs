//! Integration test: start the stub chat server on a free port, run the full
//! scripted probe with compressed pacing, and assert both participants
//! observed the whole sequence.

use lib::config::Config;
use lib::scenario;
use lib::server;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn wait_for_listener(port: u16) {
    let addr = format!("127.0.0.1:{}", port);
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(&addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("stub server did not start listening on {}", addr);
}

#[tokio::test]
async fn probe_delivers_all_scripted_messages() {
    let port = free_port();
    let mut config = Config::default();
    config.server.port = port;
    config.pacing.step_millis = 40;
    config.pacing.rapid_gap_millis = 10;
    config.pacing.status_interval_millis = 50;

    let server_config = config.clone();
    let server_handle = tokio::spawn(async move {
        let _ = server::run_server(server_config).await;
    });
    wait_for_listener(port).await;

    let url = lib::config::chat_url(&config);
    let report = scenario::run_probe(&config, &url).await.expect("probe run");

    // Ten scripted messages; the appointment room echoes each to both members.
    assert_eq!(report.doctor.sent, 5);
    assert_eq!(report.patient.sent, 5);
    assert_eq!(report.doctor.received.len(), 10);
    assert_eq!(report.patient.received.len(), 10);

    // Both sides completed the join chain exactly once.
    assert_eq!(report.doctor.joined_acks, 1);
    assert_eq!(report.doctor.appointment_acks, 1);
    assert_eq!(report.patient.joined_acks, 1);
    assert_eq!(report.patient.appointment_acks, 1);

    assert!(report.doctor.errors.is_empty(), "doctor saw errors: {:?}", report.doctor.errors);
    assert!(report.patient.errors.is_empty(), "patient saw errors: {:?}", report.patient.errors);

    let doctor_id = config.participants.doctor_user_id;
    let patient_id = config.participants.patient_user_id;
    let from_doctor = report
        .patient
        .received
        .iter()
        .filter(|m| m.sender_id == doctor_id && m.receiver_id == patient_id)
        .count();
    assert_eq!(from_doctor, 5);
    assert!(report
        .patient
        .received
        .iter()
        .all(|m| m.appointment_id == config.appointment_id && m.kind == "TEXT"));
    assert!(report
        .patient
        .received
        .iter()
        .any(|m| m.content.contains("Hello patient!")));
    assert!(report
        .doctor
        .received
        .iter()
        .any(|m| m.content.contains("Patient message 3")));

    // Message ids are server-assigned: each side saw exactly ids 1 through 10,
    // regardless of arrival interleaving between the two sockets.
    let mut doctor_ids: Vec<i64> = report.doctor.received.iter().map(|m| m.id).collect();
    doctor_ids.sort_unstable();
    assert_eq!(doctor_ids, (1..=10).collect::<Vec<i64>>());
    let mut patient_ids: Vec<i64> = report.patient.received.iter().map(|m| m.id).collect();
    patient_ids.sort_unstable();
    assert_eq!(patient_ids, (1..=10).collect::<Vec<i64>>());

    server_handle.abort();
}
