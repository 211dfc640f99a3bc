//! 运行时端到端测试（内存传输）

use jointflow_sdk::prelude::*;
use jointflow_sdk::protocol::now_millis;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn actuators(count: u8) -> String {
    (1..=count)
        .map(|id| {
            format!(
                "[[actuators]]\nid = {id}\njoint = {id}\nmin_position = 0\nmax_position = 1000\ndefault_position = 500\n"
            )
        })
        .collect()
}

fn config(extra: &str, count: u8) -> MotionConfig {
    MotionConfig::from_toml_str(&format!("{}\n{}", extra, actuators(count))).unwrap()
}

fn transport(count: u8) -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    for id in 1..=count {
        transport.add_servo(ActuatorId::new(id).unwrap(), 500);
    }
    transport
}

fn manual(config: MotionConfig, transport: &Arc<MemoryTransport>) -> MotionRuntime {
    MotionRuntime::builder(config)
        .transport(transport.clone())
        .background(false)
        .start()
        .unwrap()
}

fn n(v: f64) -> Normalized {
    Normalized::new(v).unwrap()
}

fn fixed(joint: u16, value: f64) -> Arc<dyn FrameSource> {
    Arc::new(move |time_ms: u64, interval_ms: u64| -> Option<MotionFrame> {
        let goals: PositionMap = [(JointId(joint), n(value))].into_iter().collect();
        MotionFrame::new(time_ms, interval_ms, goals, PositionMap::new()).ok()
    })
}

fn id(v: u8) -> ActuatorId {
    ActuatorId::new(v).unwrap()
}

#[test]
fn test_start_configures_every_actuator() {
    let transport = transport(2);
    let _runtime = manual(config("[servo]\nstatus_return_delay_us = 100", 2), &transport);

    let sent = transport.take_sent();
    assert_eq!(sent.len(), 4);
    assert!(sent.contains(&ServoCommand::torque_enable(id(1), true)));
    assert!(sent.iter().any(|c| matches!(
        c,
        ServoCommand::WriteData { id: target, data, .. } if *target == id(2) && data.as_slice() == [50u8]
    )));
}

#[test]
fn test_two_sources_blend_into_one_move() {
    let transport = transport(3);
    let runtime = manual(config("", 3), &transport);
    transport.take_sent();

    runtime.register_source(fixed(1, 0.9));
    runtime.register_source(fixed(2, 0.1));

    let outcome = runtime.tick(now_millis()).unwrap();
    let StepOutcome::Published(positions) = outcome else {
        panic!("expected a published tick, got {:?}", outcome);
    };
    assert_eq!(positions.get(JointId(1)), Some(n(0.9)));
    assert_eq!(positions.get(JointId(2)), Some(n(0.1)));
    assert_eq!(positions.get(JointId(3)), Some(n(0.5)));

    let moves: Vec<_> = transport
        .take_sent()
        .into_iter()
        .filter(|c| matches!(c, ServoCommand::SyncWrite { .. }))
        .collect();
    assert_eq!(moves.len(), 1);
    assert_eq!(transport.position(id(1)), Some(900));
    assert_eq!(transport.position(id(2)), Some(100));
    assert_eq!(transport.position(id(3)), Some(500));
    assert_eq!(runtime.metrics().moves_sent, 1);
}

#[test]
fn test_silent_sources_never_write() {
    let transport = transport(1);
    let runtime = manual(config("", 1), &transport);
    transport.take_sent();
    runtime.register_source(Arc::new(|_t: u64, _i: u64| -> Option<MotionFrame> { None }));

    for _ in 0..5 {
        assert_eq!(
            runtime.tick(now_millis()).unwrap(),
            StepOutcome::Skipped(SkipReason::NoFrames)
        );
    }
    assert!(transport.sent().is_empty());
    assert_eq!(runtime.blend_stats().ticks_skipped, 5);
}

#[test]
fn test_thermal_interlock_sequence() {
    let transport = transport(1);
    let runtime = manual(config("", 1), &transport);

    // 阈值 70/50
    let expected = [(60, true), (71, false), (65, false), (55, false), (49, true), (52, true)];
    for (temperature, enabled) in expected {
        transport.set_temperature(id(1), temperature);
        assert_eq!(runtime.poll_feedback(), 1);
        runtime.check_interlocks(now_millis());

        let state = runtime.actuator_state(JointId(1)).unwrap();
        assert_eq!(state.current_temperature, i32::from(temperature));
        assert_eq!(state.enabled, enabled, "at {} degrees", temperature);
        assert_eq!(transport.torque(id(1)), Some(enabled));
    }

    let metrics = runtime.metrics();
    assert_eq!(metrics.interlock_disables, 1);
    assert_eq!(metrics.interlock_enables, 1);
}

#[test]
fn test_hot_actuator_keeps_goal_but_is_not_moved() {
    let transport = transport(2);
    let runtime = manual(config("", 2), &transport);
    transport.set_temperature(id(1), 80);
    runtime.poll_feedback();
    runtime.check_interlocks(now_millis());
    assert_eq!(runtime.hot_actuators(), vec![id(1)]);

    runtime.register_source(fixed(1, 0.8));
    runtime.register_source(fixed(2, 0.2));
    runtime.tick(now_millis()).unwrap();

    assert_eq!(transport.position(id(1)), Some(500));
    assert_eq!(transport.position(id(2)), Some(200));
    let state = runtime.actuator_state(JointId(1)).unwrap();
    assert_eq!(state.goal_position, n(0.8));
    assert!(!state.enabled);
}

#[test]
fn test_idle_timeout_and_reenable() {
    let transport = transport(2);
    let runtime = manual(config("[idle]\nidle_disable_timeout_ms = 50", 2), &transport);

    let changes = runtime.check_interlocks(now_millis() + 1000);
    assert_eq!(changes.len(), 2);
    assert_eq!(transport.torque(id(1)), Some(false));

    // 只有关节 1 收到不同的目标
    runtime.register_source(fixed(1, 0.7));
    runtime.tick(now_millis()).unwrap();
    let changes = runtime.check_interlocks(now_millis());
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].id, id(1));
    assert!(changes[0].enabled);
    assert_eq!(transport.torque(id(1)), Some(true));
    assert_eq!(transport.torque(id(2)), Some(false));
}

#[test]
fn test_idle_actuator_stays_disabled_when_feedback_drifts() {
    let transport = transport(2);
    let runtime = manual(config("[idle]\nidle_disable_timeout_ms = 50", 2), &transport);
    assert_eq!(runtime.check_interlocks(now_millis() + 1000).len(), 2);

    // 断扭矩后舵机 2 下垂
    transport.set_position(id(2), 480);
    assert_eq!(runtime.poll_feedback(), 2);

    runtime.register_source(fixed(1, 0.7));
    let StepOutcome::Published(positions) = runtime.tick(now_millis()).unwrap() else {
        panic!("expected a published tick");
    };
    assert_eq!(positions.get(JointId(2)), Some(n(0.48)));

    let changes = runtime.check_interlocks(now_millis());
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].id, id(1));

    let held = runtime.actuator_state(JointId(2)).unwrap();
    assert_eq!(held.goal_position, n(0.5));
    assert!(!held.enabled);
    assert_eq!(transport.torque(id(2)), Some(false));
}

#[test]
fn test_tick_at_epoch_time_publishes() {
    let transport = transport(1);
    let runtime = manual(config("", 1), &transport);
    runtime.register_source(fixed(1, 0.3));

    assert!(matches!(runtime.tick(0).unwrap(), StepOutcome::Published(_)));
    assert_eq!(transport.position(id(1)), Some(300));
}

#[test]
fn test_operator_disable_is_independent_of_thermal() {
    let transport = transport(1);
    let runtime = manual(config("", 1), &transport);

    assert!(!runtime.set_enabled(JointId(1), false).unwrap());
    transport.set_temperature(id(1), 30);
    runtime.poll_feedback();
    runtime.check_interlocks(now_millis());
    assert!(!runtime.actuator_state(JointId(1)).unwrap().enabled);

    assert!(runtime.set_enabled(JointId(1), true).unwrap());
    assert!(matches!(
        runtime.set_enabled(JointId(9), true),
        Err(SdkError::InvalidArgument(_))
    ));
}

#[test]
fn test_background_runtime_converges_on_target() {
    let transport = transport(1);
    let config = config("[blend]\ntick_interval_ms = 5\n[servo]\nfeedback_poll_interval_ms = 5", 1);
    let mut runtime = MotionRuntime::builder(config)
        .transport(transport.clone())
        .start()
        .unwrap();
    assert!(runtime.is_running());

    let (_id, target) = runtime.add_target_source(0.01).unwrap();
    target.set_target(JointId(1), n(1.0));

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while transport.position(id(1)) != Some(1000) && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(transport.position(id(1)), Some(1000));

    runtime.shutdown();
    assert!(!runtime.is_running());
    assert!(runtime.blend_stats().ticks_published > 0);
    assert!(runtime.metrics().feedback_accepted > 0);
}

#[test]
fn test_rejects_invalid_configuration() {
    let bad = [
        "[thermal]\nmax_run_temperature = 60\ncooldown_temperature = 65",
        "[servo]\nbaud_rate = 31337",
        "[blend]\ntick_interval_ms = 0",
    ];
    for doc in bad {
        assert!(MotionConfig::from_toml_str(doc).is_err(), "{}", doc);
    }

    let mut config = MotionConfig::default();
    config.thermal.cooldown_temperature = 90;
    let err = MotionRuntime::builder(config)
        .transport(Arc::new(MemoryTransport::new()))
        .start()
        .err()
        .unwrap();
    assert!(matches!(err, SdkError::Config(ConfigError::Invalid(_))));
}
