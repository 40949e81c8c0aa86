//! End-to-end task lifecycle scenarios: launch, queueing, status
//! forwarding, executor crashes, kills, and admission control.


use std::time::Duration;

use harness::{register, res, run_task, ClusterBuilder};
use quarry_agent::config::AgentTimeouts;
use quarry_agent::isolation::{ExitReason, StubCall};
use quarry_id::{FrameworkId, TaskId};
use quarry_messages::{
    AgentToExecutor, ExecutorToAgent, MasterToAgent, TaskState, WireMessage,
};

fn fid(s: &str) -> FrameworkId {
    FrameworkId::new(s)
}

fn tid(s: &str) -> TaskId {
    TaskId::new(s)
}

#[tokio::test]
async fn happy_path_start_run_finish() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));

    let (f, t, state, _) = c.master().expect_status().await;
    assert_eq!((f, t, state), (fid("f1"), tid("t1"), TaskState::Starting));
    assert_eq!(c.stub.launch_count(), 1);

    // Executor comes up and drains the protocol.
    let mut exec = c.bind_peer("exec-f1");
    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::Register {
            framework_id: fid("f1"),
        }),
    );
    match exec.recv_wire().await {
        WireMessage::Command(AgentToExecutor::RunTask { task }) => {
            assert_eq!(task.task_id, tid("t1"));
        }
        other => panic!("expected run task, got {other:?}"),
    }

    for state in [TaskState::Running, TaskState::Finished] {
        exec.send(
            &c.agent_addr,
            WireMessage::Executor(ExecutorToAgent::StatusUpdate {
                framework_id: fid("f1"),
                task_id: tid("t1"),
                state,
                message: String::new(),
            }),
        );
        let (_, t, seen, _) = c.master().expect_status().await;
        assert_eq!((t, seen), (tid("t1"), state));
        match exec.recv_wire().await {
            WireMessage::Command(AgentToExecutor::StatusUpdateAck { task_id }) => {
                assert_eq!(task_id, tid("t1"));
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    // Everything was released: a fresh framework can take the whole
    // capacity again.
    c.from_master(run_task("f2", "t2", res(4.0, 1024)));
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t2"), TaskState::Starting));
}

#[tokio::test]
async fn queued_tasks_flush_in_master_arrival_order() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.from_master(run_task("f1", "t2", res(1.0, 128)));

    for expected in ["t1", "t2"] {
        let (_, t, state, _) = c.master().expect_status().await;
        assert_eq!((t, state), (tid(expected), TaskState::Starting));
    }
    // One framework, one executor launch.
    assert_eq!(c.stub.launch_count(), 1);

    let mut exec = c.bind_peer("exec-f1");
    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::Register {
            framework_id: fid("f1"),
        }),
    );

    for expected in ["t1", "t2"] {
        match exec.recv_wire().await {
            WireMessage::Command(AgentToExecutor::RunTask { task }) => {
                assert_eq!(task.task_id, tid(expected));
            }
            other => panic!("expected run task, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn executor_crash_marks_tasks_lost_and_releases_resources() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(4.0, 1024)));
    c.master().expect_status().await;

    let mut exec = c.bind_peer("exec-f1");
    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::Register {
            framework_id: fid("f1"),
        }),
    );
    exec.recv_wire().await; // the forwarded launch
    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::StatusUpdate {
            framework_id: fid("f1"),
            task_id: tid("t1"),
            state: TaskState::Running,
            message: String::new(),
        }),
    );
    c.master().expect_status().await;
    exec.recv_wire().await; // ack

    c.stub.inject_exit(fid("f1"), ExitReason::Exited(1)).await;

    let (f, t, state, message) = c.master().expect_status().await;
    assert_eq!((f, t, state), (fid("f1"), tid("t1"), TaskState::Lost));
    assert_eq!(message, "executor exited");

    // The framework record is gone and the whole capacity is free: a
    // fresh launch for the same framework starts a second executor.
    c.from_master(run_task("f1", "t2", res(4.0, 1024)));
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t2"), TaskState::Starting));
    assert_eq!(c.stub.launch_count(), 2);
}

#[tokio::test]
async fn crash_before_registration_loses_queued_tasks() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.from_master(run_task("f1", "t2", res(1.0, 128)));
    c.master().expect_status().await;
    c.master().expect_status().await;

    // The executor dies before ever registering; both queued tasks are
    // surfaced, not silently dropped.
    c.stub
        .inject_exit(fid("f1"), ExitReason::Failed("spawn failed".to_string()))
        .await;

    let mut lost = Vec::new();
    for _ in 0..2 {
        let (_, t, state, message) = c.master().expect_status().await;
        assert_eq!(state, TaskState::Lost);
        assert_eq!(message, "executor exited");
        lost.push(t);
    }
    lost.sort();
    assert_eq!(lost, vec![tid("t1"), tid("t2")]);
}

#[tokio::test]
async fn kill_framework_shuts_executor_down_then_forces_it() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().expect_status().await;

    let mut exec = c.bind_peer("exec-f1");
    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::Register {
            framework_id: fid("f1"),
        }),
    );
    exec.recv_wire().await;
    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::StatusUpdate {
            framework_id: fid("f1"),
            task_id: tid("t1"),
            state: TaskState::Running,
            message: String::new(),
        }),
    );
    c.master().expect_status().await;
    exec.recv_wire().await;

    c.from_master(MasterToAgent::KillFramework {
        framework_id: fid("f1"),
    });

    // Graceful shutdown first.
    match exec.recv_wire().await {
        WireMessage::Command(AgentToExecutor::Shutdown) => {}
        other => panic!("expected shutdown, got {other:?}"),
    }

    // The executor ignores it; the grace timer forces a kill.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while c.stub.kill_count() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "no forced kill");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(c
        .stub
        .calls()
        .contains(&StubCall::Kill {
            framework_id: fid("f1")
        }));

    // The backend finally reports the exit; the running task surfaces
    // as lost.
    c.stub.inject_exit(fid("f1"), ExitReason::Signaled(9)).await;
    let (_, t, state, message) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Lost));
    assert_eq!(message, "executor exited");
}

#[tokio::test]
async fn kill_task_before_executor_registers() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(4.0, 1024)));
    c.master().expect_status().await;

    c.from_master(MasterToAgent::KillTask {
        framework_id: fid("f1"),
        task_id: tid("t1"),
    });
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Killed));

    // Resources were released with the queued task.
    c.from_master(run_task("f2", "t2", res(4.0, 1024)));
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t2"), TaskState::Starting));
}

#[tokio::test]
async fn overcommit_is_rejected_without_side_effects() {
    let mut c = ClusterBuilder::new(res(1.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(2.0, 128)));
    let (_, t, state, message) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Lost));
    assert_eq!(message, "insufficient resources");

    // No framework record, no executor launch.
    assert_eq!(c.stub.launch_count(), 0);

    // Committed is unchanged: a task that fits is accepted.
    c.from_master(run_task("f1", "t2", res(1.0, 128)));
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t2"), TaskState::Starting));
}

#[tokio::test]
async fn zero_resource_task_is_accepted() {
    let mut c = ClusterBuilder::new(res(1.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(0.0, 0)));
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Starting));
}

#[tokio::test]
async fn kill_of_unknown_task_is_acknowledged() {
    let mut c = ClusterBuilder::new(res(1.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(MasterToAgent::KillTask {
        framework_id: fid("f1"),
        task_id: tid("t1"),
    });
    let (f, t, state, _) = c.master().expect_status().await;
    assert_eq!((f, t, state), (fid("f1"), tid("t1"), TaskState::Lost));
}

#[tokio::test]
async fn second_executor_for_a_framework_is_refused() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().expect_status().await;

    let mut exec = c.bind_peer("exec-f1");
    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::Register {
            framework_id: fid("f1"),
        }),
    );
    exec.recv_wire().await;

    // An impostor registering for the same framework is told to go
    // away; the original link keeps working.
    let mut impostor = c.bind_peer("exec-f1-impostor");
    impostor.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::Register {
            framework_id: fid("f1"),
        }),
    );
    match impostor.recv_wire().await {
        WireMessage::Command(AgentToExecutor::Shutdown) => {}
        other => panic!("expected shutdown, got {other:?}"),
    }

    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::StatusUpdate {
            framework_id: fid("f1"),
            task_id: tid("t1"),
            state: TaskState::Running,
            message: String::new(),
        }),
    );
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Running));
}

#[tokio::test]
async fn duplicate_terminal_update_is_forwarded_once() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().expect_status().await;

    let mut exec = c.bind_peer("exec-f1");
    exec.send(
        &c.agent_addr,
        WireMessage::Executor(ExecutorToAgent::Register {
            framework_id: fid("f1"),
        }),
    );
    exec.recv_wire().await;

    for _ in 0..2 {
        exec.send(
            &c.agent_addr,
            WireMessage::Executor(ExecutorToAgent::StatusUpdate {
                framework_id: fid("f1"),
                task_id: tid("t1"),
                state: TaskState::Finished,
                message: String::new(),
            }),
        );
    }

    // One forwarded update; the duplicate is only acknowledged.
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Finished));
    c.master().assert_silent(Duration::from_millis(200)).await;

    // Both deliveries were acknowledged to the executor.
    for _ in 0..2 {
        match exec.recv_wire().await {
            WireMessage::Command(AgentToExecutor::StatusUpdateAck { task_id }) => {
                assert_eq!(task_id, tid("t1"));
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn replayed_launch_is_idempotent() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().expect_status().await;

    // A byte-identical replay (as after a master failover) is dropped.
    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().assert_silent(Duration::from_millis(200)).await;
    assert_eq!(c.stub.launch_count(), 1);
}

#[tokio::test]
async fn replayed_launch_at_full_capacity_is_still_idempotent() {
    let mut c = ClusterBuilder::new(res(1.0, 128)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    let (_, t, state, _) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Starting));

    // The task already fills the agent; a replay must be recognized as
    // such, not double-charged into a bogus rejection.
    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().assert_silent(Duration::from_millis(200)).await;
    assert_eq!(c.stub.launch_count(), 1);
}

#[tokio::test]
async fn conflicting_duplicate_task_id_aborts_the_agent() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(4.0, 1024)));
    c.master().expect_status().await;

    // Same id, different resources. Even though this launch would also
    // exceed capacity, it is a contract breach, not an admission
    // failure: the agent aborts.
    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    tokio::time::timeout(Duration::from_secs(5), &mut c.join)
        .await
        .expect("agent did not abort on a duplicate task id")
        .unwrap();
}

#[tokio::test]
async fn registration_timeout_is_treated_as_an_exit() {
    let timeouts = AgentTimeouts {
        registration: Duration::from_millis(150),
        kill_grace: Duration::from_millis(100),
        master_grace: Duration::from_millis(200),
    };
    let mut c = ClusterBuilder::new(res(4.0, 1024))
        .timeouts(timeouts)
        .start()
        .await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().expect_status().await;

    // Nobody registers; the window closes.
    let (_, t, state, message) = c.master().expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Lost));
    assert_eq!(message, "executor exited");
    assert!(c.stub.kill_count() >= 1);
}

#[tokio::test]
async fn shutdown_kills_all_executors() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().expect_status().await;
    c.from_master(run_task("f2", "t2", res(1.0, 128)));
    c.master().expect_status().await;

    c.events
        .send(quarry_agent::AgentEvent::Shutdown)
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), &mut c.join)
        .await
        .expect("agent did not stop")
        .unwrap();

    assert_eq!(c.stub.kill_count(), 2);
}
