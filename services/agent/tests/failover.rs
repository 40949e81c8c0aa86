//! Master failover scenarios: leader changes, re-registration, and the
//! two master-loss policies.


use std::time::Duration;

use harness::{res, run_task, ClusterBuilder, Peer};
use quarry_agent::isolation::ExitReason;
use quarry_id::{AgentId, FrameworkId, TaskId};
use quarry_messages::{
    AgentToExecutor, AgentToMaster, ExecutorToAgent, MasterToAgent, TaskState, WireMessage,
};

fn fid(s: &str) -> FrameworkId {
    FrameworkId::new(s)
}

fn tid(s: &str) -> TaskId {
    TaskId::new(s)
}

async fn expect_reregister(
    peer: &mut Peer,
) -> (Option<AgentId>, usize, Vec<(TaskId, TaskState)>) {
    match peer.recv_wire().await {
        WireMessage::Agent(AgentToMaster::Reregister {
            agent_id,
            executors,
            tasks,
            ..
        }) => (
            agent_id,
            executors.len(),
            tasks.into_iter().map(|t| (t.task_id, t.state)).collect(),
        ),
        other => panic!("expected reregister, got {other:?}"),
    }
}

#[tokio::test]
async fn leader_change_reregisters_without_killing_executors() {
    let mut c = ClusterBuilder::new(res(4.0, 1024))
        .fault_tolerant()
        .start()
        .await;

    // First election.
    let mut m1 = c.bind_peer("master1");
    c.leader_tx
        .as_ref()
        .unwrap()
        .send(Some(m1.addr()))
        .unwrap();

    let (agent_id, executors, tasks) = expect_reregister(&mut m1).await;
    assert_eq!(agent_id, None);
    assert_eq!((executors, tasks.len()), (0, 0));
    m1.send(
        &c.agent_addr,
        WireMessage::Master(MasterToAgent::Registered {
            agent_id: AgentId::new("a1"),
        }),
    );

    // Run a task to RUNNING under the first master.
    m1.send(
        &c.agent_addr,
        WireMessage::Master(run_task("f1", "t1", res(1.0, 128))),
    );
    let (_, t, state, _) = m1.expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Starting));

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
    m1.expect_status().await;
    exec.recv_wire().await;

    // Second election: the agent re-registers with its id and a full
    // snapshot, and nothing is killed.
    let mut m2 = c.bind_peer("master2");
    c.leader_tx
        .as_ref()
        .unwrap()
        .send(Some(m2.addr()))
        .unwrap();

    let (agent_id, executors, tasks) = expect_reregister(&mut m2).await;
    assert_eq!(agent_id, Some(AgentId::new("a1")));
    assert_eq!(executors, 1);
    assert_eq!(tasks, vec![(tid("t1"), TaskState::Running)]);
    assert_eq!(c.stub.kill_count(), 0);

    m2.send(
        &c.agent_addr,
        WireMessage::Master(MasterToAgent::ReregisterAck {
            agent_id: AgentId::new("a1"),
        }),
    );

    // The new master is in charge: its launches are accepted and reach
    // the surviving executor.
    m2.send(
        &c.agent_addr,
        WireMessage::Master(run_task("f1", "t2", res(1.0, 128))),
    );
    let (_, t, state, _) = m2.expect_status().await;
    assert_eq!((t, state), (tid("t2"), TaskState::Starting));
    match exec.recv_wire().await {
        WireMessage::Command(AgentToExecutor::RunTask { task }) => {
            assert_eq!(task.task_id, tid("t2"));
        }
        other => panic!("expected run task, got {other:?}"),
    }

    // The deposed master is ignored.
    m1.send(
        &c.agent_addr,
        WireMessage::Master(run_task("f1", "t9", res(1.0, 128))),
    );
    m2.assert_silent(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn repeated_leader_announcement_reregisters_once() {
    let mut c = ClusterBuilder::new(res(4.0, 1024))
        .fault_tolerant()
        .start()
        .await;

    let mut m1 = c.bind_peer("master1");
    let tx = c.leader_tx.as_ref().unwrap();
    tx.send(Some(m1.addr())).unwrap();

    expect_reregister(&mut m1).await;
    m1.send(
        &c.agent_addr,
        WireMessage::Master(MasterToAgent::Registered {
            agent_id: AgentId::new("a1"),
        }),
    );

    // The watcher reports the same leader again; the agent must not
    // re-register a second time.
    tx.send(Some(m1.addr())).unwrap();
    m1.assert_silent(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn master_loss_without_fault_tolerance_shuts_the_agent_down() {
    let mut c = ClusterBuilder::new(res(4.0, 1024)).start().await;
    harness::register(&mut c, "a1").await;

    c.from_master(run_task("f1", "t1", res(1.0, 128)));
    c.master().expect_status().await;

    // The master goes away for good.
    let master = c.master.take().unwrap();
    drop(master);

    tokio::time::timeout(Duration::from_secs(5), &mut c.join)
        .await
        .expect("agent did not shut down after losing its master")
        .unwrap();
    assert_eq!(c.stub.kill_count(), 1);
}

#[tokio::test]
async fn master_loss_in_fault_tolerant_mode_keeps_executors() {
    let mut c = ClusterBuilder::new(res(4.0, 1024))
        .fault_tolerant()
        .start()
        .await;

    let m1 = c.bind_peer("master1");
    c.leader_tx
        .as_ref()
        .unwrap()
        .send(Some(m1.addr()))
        .unwrap();
    let mut m1 = m1;
    expect_reregister(&mut m1).await;
    m1.send(
        &c.agent_addr,
        WireMessage::Master(MasterToAgent::Registered {
            agent_id: AgentId::new("a1"),
        }),
    );

    m1.send(
        &c.agent_addr,
        WireMessage::Master(run_task("f1", "t1", res(1.0, 128))),
    );
    m1.expect_status().await;

    // The elected master dies. The agent waits instead of shutting
    // down; nothing is killed.
    drop(m1);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(c.stub.kill_count(), 0);
    assert!(!c.join.is_finished());

    // A new leader appears and adopts the intact state.
    let mut m2 = c.bind_peer("master2");
    c.leader_tx
        .as_ref()
        .unwrap()
        .send(Some(m2.addr()))
        .unwrap();
    let (agent_id, _, tasks) = expect_reregister(&mut m2).await;
    assert_eq!(agent_id, Some(AgentId::new("a1")));
    assert_eq!(tasks, vec![(tid("t1"), TaskState::Starting)]);
}

#[tokio::test]
async fn fresh_registration_after_failover_reannounces_live_tasks() {
    let mut c = ClusterBuilder::new(res(4.0, 1024))
        .fault_tolerant()
        .start()
        .await;

    let mut m1 = c.bind_peer("master1");
    c.leader_tx
        .as_ref()
        .unwrap()
        .send(Some(m1.addr()))
        .unwrap();
    expect_reregister(&mut m1).await;
    m1.send(
        &c.agent_addr,
        WireMessage::Master(MasterToAgent::Registered {
            agent_id: AgentId::new("a1"),
        }),
    );

    m1.send(
        &c.agent_addr,
        WireMessage::Master(run_task("f1", "t1", res(1.0, 128))),
    );
    m1.expect_status().await;

    // The new master did not adopt our snapshot and answers with a
    // fresh registration instead; the agent re-announces what is live.
    let mut m2 = c.bind_peer("master2");
    c.leader_tx
        .as_ref()
        .unwrap()
        .send(Some(m2.addr()))
        .unwrap();
    expect_reregister(&mut m2).await;
    m2.send(
        &c.agent_addr,
        WireMessage::Master(MasterToAgent::Registered {
            agent_id: AgentId::new("a2"),
        }),
    );

    let (_, t, state, _) = m2.expect_status().await;
    assert_eq!((t, state), (tid("t1"), TaskState::Starting));
}

#[tokio::test]
async fn executor_exit_during_leaderless_window_is_reported_to_the_next_master() {
    let mut c = ClusterBuilder::new(res(4.0, 1024))
        .fault_tolerant()
        .start()
        .await;

    let mut m1 = c.bind_peer("master1");
    c.leader_tx
        .as_ref()
        .unwrap()
        .send(Some(m1.addr()))
        .unwrap();
    expect_reregister(&mut m1).await;
    m1.send(
        &c.agent_addr,
        WireMessage::Master(MasterToAgent::Registered {
            agent_id: AgentId::new("a1"),
        }),
    );
    m1.send(
        &c.agent_addr,
        WireMessage::Master(run_task("f1", "t1", res(1.0, 128))),
    );
    m1.expect_status().await;

    drop(m1);

    // The executor dies while no master is reachable; the lost update
    // is dropped on the floor (transport policy), but the bookkeeping
    // settles: the next master's snapshot is already clean.
    c.stub.inject_exit(fid("f1"), ExitReason::Exited(1)).await;

    let mut m2 = c.bind_peer("master2");
    c.leader_tx
        .as_ref()
        .unwrap()
        .send(Some(m2.addr()))
        .unwrap();
    let (agent_id, executors, tasks) = expect_reregister(&mut m2).await;
    assert_eq!(agent_id, Some(AgentId::new("a1")));
    assert_eq!((executors, tasks.len()), (0, 0));
}
