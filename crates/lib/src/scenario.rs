//! The scripted probe: two participants (doctor and patient), a fixed-timer
//! sequence of joins and messages, a periodic connection status monitor, and a
//! final delivery report.
//!
//! Delays are approximate pacing, not synchronization: a send is never gated on
//! the counterpart's join state. Everything received is logged and counted,
//! never acted upon.

use crate::client::{ChatClient, ServerEvent};
use crate::config::{Config, PacingConfig};
use crate::protocol::{MessageRecord, SendMessagePayload, MESSAGE_TYPE_TEXT};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Which side of the conversation a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }
}

/// One timed send, offset relative to run start.
#[derive(Debug, Clone)]
pub struct SendStep {
    pub at: Duration,
    pub from: Role,
    pub content: String,
}

/// Build the fixed script. With default pacing this reproduces the original
/// 3/6/9/12-second single messages and the 15- and 18-second rapid bursts.
pub fn script(pacing: &PacingConfig) -> Vec<SendStep> {
    let step = Duration::from_millis(pacing.step_millis);
    let gap = Duration::from_millis(pacing.rapid_gap_millis);

    let mut steps = vec![
        SendStep {
            at: step,
            from: Role::Doctor,
            content: "Hello patient! This is a test message from the doctor.".to_string(),
        },
        SendStep {
            at: 2 * step,
            from: Role::Patient,
            content: "Hello doctor! This is a test message from the patient.".to_string(),
        },
        SendStep {
            at: 3 * step,
            from: Role::Doctor,
            content: "Second message: How are you feeling today?".to_string(),
        },
        SendStep {
            at: 4 * step,
            from: Role::Patient,
            content: "I am feeling much better, thank you doctor!".to_string(),
        },
    ];
    for i in 1..=3u32 {
        steps.push(SendStep {
            at: 5 * step + i * gap,
            from: Role::Doctor,
            content: format!("Rapid message {}: Testing real-time sync", i),
        });
    }
    for i in 1..=3u32 {
        steps.push(SendStep {
            at: 6 * step + i * gap,
            from: Role::Patient,
            content: format!("Patient message {}: Testing real-time sync from patient", i),
        });
    }
    steps
}

/// Everything one participant observed during the run.
#[derive(Debug, Default, Clone)]
pub struct ParticipantStats {
    pub sent: usize,
    pub joined_acks: usize,
    pub appointment_acks: usize,
    /// `new-message` records in arrival order.
    pub received: Vec<MessageRecord>,
    pub errors: Vec<String>,
    pub disconnects: usize,
}

/// Final observational report; no pass/fail judgement is applied.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub doctor: ParticipantStats,
    pub patient: ParticipantStats,
}

impl ProbeReport {
    pub fn summary(&self) -> String {
        fn line(label: &str, s: &ParticipantStats) -> String {
            format!(
                "{}: sent {}, received {}, join acks {}/{}, errors {}, disconnects {}",
                label,
                s.sent,
                s.received.len(),
                s.joined_acks,
                s.appointment_acks,
                s.errors.len(),
                s.disconnects
            )
        }
        format!(
            "{}\n{}",
            line("doctor", &self.doctor),
            line("patient", &self.patient)
        )
    }
}

struct Participant {
    client: ChatClient,
    stats: Arc<Mutex<ParticipantStats>>,
    listener: JoinHandle<()>,
}

impl Participant {
    /// Connect, emit `join-user`, and start the listener that drives the join
    /// chain (`joined` => `join-appointment`) and records inbound events.
    async fn join(url: &str, role: Role, user_id: i64, appointment_id: i64) -> Result<Self> {
        let (client, mut events) = ChatClient::connect(url)
            .await
            .with_context(|| format!("connecting {} client", role.label()))?;
        log::info!(
            "{} socket connected ({})",
            role.label(),
            client.connection_id()
        );

        client
            .emit_join_user(user_id)
            .await
            .with_context(|| format!("{} join-user", role.label()))?;

        let stats = Arc::new(Mutex::new(ParticipantStats::default()));
        let listener = tokio::spawn({
            let client = client.clone();
            let stats = stats.clone();
            let label = role.label();
            async move {
                while let Some(event) = events.recv().await {
                    match event {
                        ServerEvent::Joined(data) => {
                            log::info!("{} joined chat room: {}", label, data);
                            stats.lock().await.joined_acks += 1;
                            log::info!("{} joining appointment room {}", label, appointment_id);
                            if let Err(e) = client.emit_join_appointment(appointment_id).await {
                                log::warn!("{} join-appointment failed: {}", label, e);
                            }
                        }
                        ServerEvent::AppointmentJoined(data) => {
                            log::info!("{} joined appointment room: {}", label, data);
                            stats.lock().await.appointment_acks += 1;
                        }
                        ServerEvent::NewMessage(message) => {
                            log::info!(
                                "{} received new message: {}",
                                label,
                                message.content
                            );
                            log::info!(
                                "{} message details: id={} senderId={} receiverId={} appointmentId={} createdAt={}",
                                label,
                                message.id,
                                message.sender_id,
                                message.receiver_id,
                                message.appointment_id,
                                message.created_at
                            );
                            stats.lock().await.received.push(message);
                        }
                        ServerEvent::ServerError(message) => {
                            log::error!("{} socket error: {}", label, message);
                            stats.lock().await.errors.push(message);
                        }
                        ServerEvent::Disconnected => {
                            log::info!("{} socket disconnected", label);
                            stats.lock().await.disconnects += 1;
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            client,
            stats,
            listener,
        })
    }
}

/// Spawn the periodic connection status log (the original script's 3-second
/// `setInterval`). Aborted by the runner when the sequence finishes.
fn spawn_status_monitor(doctor: ChatClient, patient: ChatClient, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.tick().await; // immediate first tick
        loop {
            tick.tick().await;
            let status = |c: &ChatClient| {
                if c.is_connected() {
                    "connected"
                } else {
                    "disconnected"
                }
            };
            log::info!(
                "connection status: doctor {} ({}), patient {} ({})",
                status(&doctor),
                doctor.connection_id(),
                status(&patient),
                patient.connection_id()
            );
        }
    })
}

/// Run the full scripted probe against the chat server at `url`.
pub async fn run_probe(config: &Config, url: &str) -> Result<ProbeReport> {
    let appointment_id = config.appointment_id;

    let doctor = Participant::join(
        url,
        Role::Doctor,
        config.participants.doctor_user_id,
        appointment_id,
    )
    .await?;
    let patient = Participant::join(
        url,
        Role::Patient,
        config.participants.patient_user_id,
        appointment_id,
    )
    .await?;

    let start = tokio::time::Instant::now();
    let status = spawn_status_monitor(
        doctor.client.clone(),
        patient.client.clone(),
        Duration::from_millis(config.pacing.status_interval_millis),
    );

    let mut steps = script(&config.pacing);
    steps.sort_by_key(|s| s.at);
    for step in steps {
        tokio::time::sleep_until(start + step.at).await;
        let (participant, receiver_id) = match step.from {
            Role::Doctor => (&doctor, config.participants.patient_user_id),
            Role::Patient => (&patient, config.participants.doctor_user_id),
        };
        log::info!("{} sending message: {}", step.from.label(), step.content);
        participant
            .client
            .emit_send_message(SendMessagePayload {
                receiver_id,
                appointment_id,
                content: step.content.clone(),
                kind: MESSAGE_TYPE_TEXT.to_string(),
            })
            .await
            .with_context(|| format!("{} send-message", step.from.label()))?;
        participant.stats.lock().await.sent += 1;
    }

    // Cleanup phase: the original script disconnects at 8x the base step.
    tokio::time::sleep_until(start + Duration::from_millis(config.pacing.step_millis * 8)).await;
    log::info!("cleaning up probe connections");
    status.abort();
    doctor.client.close().await;
    patient.client.close().await;

    let Participant {
        stats: doctor_stats,
        listener: doctor_listener,
        ..
    } = doctor;
    let Participant {
        stats: patient_stats,
        listener: patient_listener,
        ..
    } = patient;

    // Give the listeners a moment to observe the close.
    let _ = tokio::time::timeout(Duration::from_secs(2), doctor_listener).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), patient_listener).await;

    let report = ProbeReport {
        doctor: doctor_stats.lock().await.clone(),
        patient: patient_stats.lock().await.clone(),
    };
    log::info!("probe completed");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacing(step: u64, gap: u64) -> PacingConfig {
        PacingConfig {
            step_millis: step,
            rapid_gap_millis: gap,
            status_interval_millis: 1000,
        }
    }

    #[test]
    fn script_has_ten_sends_evenly_split() {
        let steps = script(&pacing(3000, 500));
        assert_eq!(steps.len(), 10);
        let doctor = steps.iter().filter(|s| s.from == Role::Doctor).count();
        assert_eq!(doctor, 5);
    }

    #[test]
    fn script_offsets_match_original_timers() {
        let steps = script(&pacing(3000, 500));
        assert_eq!(steps[0].at, Duration::from_millis(3000));
        assert_eq!(steps[1].at, Duration::from_millis(6000));
        assert_eq!(steps[3].at, Duration::from_millis(12000));
        // rapid bursts at 15s and 18s plus the 500 ms gap
        assert_eq!(steps[4].at, Duration::from_millis(15500));
        assert_eq!(steps[9].at, Duration::from_millis(19500));
    }

    #[test]
    fn script_is_monotonic_after_sort() {
        let mut steps = script(&pacing(40, 10));
        steps.sort_by_key(|s| s.at);
        for pair in steps.windows(2) {
            assert!(pair[0].at <= pair[1].at);
        }
    }

    #[test]
    fn report_summary_names_both_sides() {
        let report = ProbeReport {
            doctor: ParticipantStats::default(),
            patient: ParticipantStats::default(),
        };
        let s = report.summary();
        assert!(s.contains("doctor: sent 0"));
        assert!(s.contains("patient: sent 0"));
    }
}
