//! End-to-end scenarios exercised against `Server`'s RPC handlers directly
//! (no socket), covering lifecycle transitions and chunking behavior.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rtc_policy_server::inbox::SimilarityConfig;
use rtc_policy_server::model::MockPolicyLoader;
use rtc_policy_server::observation::{Observation, TimedObservation};
use rtc_policy_server::policy_config::RemotePolicyConfig;
use rtc_policy_server::rtc::{PrefixAttentionSchedule, RTCConfig};
use rtc_policy_server::server::{Server, ServerConfig, ServerPhase};
use rtc_policy_server::tensor::Tensor;

fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        fps: 30.0,
        inference_latency_s: 0.0,
        obs_queue_timeout: Duration::from_millis(100),
        actions_per_chunk_cap: 1000,
    }
}

fn policy_config(execution_horizon: usize, chunk_size: usize) -> RemotePolicyConfig {
    RemotePolicyConfig {
        policy_type: "act".into(),
        pretrained_name_or_path: "local/test".into(),
        actions_per_chunk: chunk_size,
        device: "cpu".into(),
        lerobot_features: vec!["observation.state".into()],
        rename_map: HashMap::new(),
        rtc_config: RTCConfig::new(
            true,
            execution_horizon,
            5.0,
            PrefixAttentionSchedule::Exp,
            false,
            0,
            chunk_size,
        )
        .unwrap(),
        similarity_config: SimilarityConfig::default(),
    }
}

fn observation_with_state(timestep: u64, value: f32, must_go: bool) -> TimedObservation {
    let mut obs = Observation::default();
    obs.insert("state", Tensor::new(vec![1], vec![value]));
    TimedObservation::new(timestep, timestep as f64 / 30.0, obs, must_go)
}

/// Scenario: cold start. The server starts `Unconfigured`; `GetActions`
/// and `SendObservations` are rejected until `SendPolicyInstructions`
/// succeeds, after which the first `GetActions` returns a full chunk.
#[tokio::test]
async fn cold_start_then_first_inference() {
    let server = Server::new(server_config(), Arc::new(MockPolicyLoader));
    assert_eq!(server.phase(), ServerPhase::Unconfigured);

    let rejected = server.handle_send_observations(observation_with_state(0, 0.0, false));
    assert!(rejected.is_err());

    server
        .handle_send_policy_instructions(policy_config(4, 10))
        .unwrap();
    assert_eq!(server.phase(), ServerPhase::Ready);

    server
        .handle_send_observations(observation_with_state(0, 0.0, false))
        .unwrap();
    let actions = server.handle_get_actions().await.unwrap();
    assert_eq!(actions.len(), 10);
    assert_eq!(actions[0].timestep, 0);
    assert_eq!(actions[9].timestep, 9);
}

/// Scenario: freshness. Two observations arrive before any `GetActions`;
/// only the freshest one should have fed inference (if the first had
/// already been consumed it would be rejected as a duplicate timestep),
/// and the returned chunk is keyed to that freshest observation's own
/// timestep, not any internal counter.
#[tokio::test]
async fn freshest_observation_wins_when_none_consumed_yet() {
    let server = Server::new(server_config(), Arc::new(MockPolicyLoader));
    server
        .handle_send_policy_instructions(policy_config(2, 8))
        .unwrap();

    server
        .handle_send_observations(observation_with_state(0, 0.0, false))
        .unwrap();
    server
        .handle_send_observations(observation_with_state(1, 50.0, false))
        .unwrap();

    let actions = server.handle_get_actions().await.unwrap();
    assert_eq!(actions.len(), 8);
    assert_eq!(actions[0].timestep, 1);
}

/// Scenario: dedup. After an observation's timestep has been consumed by
/// `GetActions`, a duplicate of that same timestep is rejected, even
/// though nothing new has replaced it.
#[tokio::test]
async fn duplicate_timestep_after_consumption_is_rejected() {
    let server = Server::new(server_config(), Arc::new(MockPolicyLoader));
    server
        .handle_send_policy_instructions(policy_config(2, 6))
        .unwrap();

    server
        .handle_send_observations(observation_with_state(5, 0.0, false))
        .unwrap();
    server.handle_get_actions().await.unwrap();

    let accepted = server.handle_send_observations(observation_with_state(5, 0.0, false));
    assert!(accepted.is_ok());
    let timed_out = server.handle_get_actions().await;
    assert!(timed_out.is_err());
}

/// Scenario: RTC stitch. Two consecutive inference cycles leave a leftover
/// suffix from the first chunk that guides the second.
#[tokio::test]
async fn second_inference_is_guided_by_first_chunks_leftover() {
    let server = Server::new(server_config(), Arc::new(MockPolicyLoader));
    server
        .handle_send_policy_instructions(policy_config(3, 20))
        .unwrap();

    server
        .handle_send_observations(observation_with_state(0, 0.0, false))
        .unwrap();
    let first = server.handle_get_actions().await.unwrap();
    assert_eq!(first.len(), 20);

    server
        .handle_send_observations(observation_with_state(1, 1.0, false))
        .unwrap();
    let second = server.handle_get_actions().await.unwrap();
    assert_eq!(second.len(), 20);
    // Continuity: the second chunk's timestep picks up where the first
    // chunk's consumed prefix left off, not restarting at 0.
    assert!(second[0].timestep >= first[0].timestep);
}

/// Scenario: stale inference. A `real_delay` at or beyond `chunk_size`
/// would be rejected by `ActionQueue::merge`; exercised directly against
/// the action queue type since reproducing a multi-second delay through
/// the full async engine would make this test slow without adding
/// coverage (`rtc::action_queue` already covers the merge rejection path
/// in its own unit tests).
#[test]
fn stale_inference_is_rejected_by_the_action_queue() {
    use rtc_policy_server::rtc::ActionQueue;
    use rtc_policy_server::tensor::Chunk2D;

    let mut queue = ActionQueue::new(4);
    let chunk = Chunk2D::zeros(10, 1);
    let err = queue.merge(&chunk, &chunk, 10, 0);
    assert!(err.is_err());
}

/// Scenario: must_go override. An observation flagged `must_go` is
/// admitted even though its timestep was already consumed.
#[tokio::test]
async fn must_go_observation_bypasses_dedup() {
    let server = Server::new(server_config(), Arc::new(MockPolicyLoader));
    server
        .handle_send_policy_instructions(policy_config(2, 6))
        .unwrap();

    server
        .handle_send_observations(observation_with_state(9, 0.0, false))
        .unwrap();
    server.handle_get_actions().await.unwrap();

    server
        .handle_send_observations(observation_with_state(9, 0.0, true))
        .unwrap();
    let actions = server.handle_get_actions().await;
    assert!(actions.is_ok());
}

/// `Ready` resets all transient state: a pending observation and the
/// action queue's leftover are both cleared.
#[tokio::test]
async fn ready_clears_pending_observation_and_leftover() {
    let server = Server::new(server_config(), Arc::new(MockPolicyLoader));
    server
        .handle_send_policy_instructions(policy_config(2, 6))
        .unwrap();
    server
        .handle_send_observations(observation_with_state(0, 0.0, false))
        .unwrap();

    server.handle_ready();
    assert_eq!(server.phase(), ServerPhase::Unconfigured);

    let rejected = server.handle_get_actions().await;
    assert!(rejected.is_err());
}
