//! Waiting helpers for task services

use std::time::Duration;
use standards_dl::{Job, Task, TaskEvent, TaskId, TaskService};
use tokio::sync::broadcast;

/// Wait for a task to reach a terminal state, panicking after `timeout`
pub async fn wait_for_terminal<J: Job>(
    service: &TaskService<J>,
    id: TaskId,
    timeout: Duration,
) -> Task<J::Input, J::Output> {
    match tokio::time::timeout(timeout, service.wait(id)).await {
        Ok(Ok(task)) => task,
        Ok(Err(e)) => panic!("task {id} vanished: {e}"),
        Err(_) => panic!("task {id} did not finish within {timeout:?}"),
    }
}

/// Collect the events of one task up to and including its terminal event
pub async fn collect_events_until_terminal<O: Clone>(
    rx: &mut broadcast::Receiver<TaskEvent<O>>,
    id: TaskId,
    timeout: Duration,
) -> Vec<TaskEvent<O>> {
    let collected = tokio::time::timeout(timeout, async {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) if event.task_id == id => {
                    let terminal = event.event.is_terminal();
                    events.push(event);
                    if terminal {
                        return events;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return events,
            }
        }
    })
    .await;

    match collected {
        Ok(events) => events,
        Err(_) => panic!("no terminal event for task {id} within {timeout:?}"),
    }
}
