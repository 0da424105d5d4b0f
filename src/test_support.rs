//! Shared helpers for manager tests: bus polling with timeouts.

use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{error::TryRecvError, Receiver};

use crate::protocol::Message;

pub fn wait_for_message<F>(
    receiver: &mut Receiver<Message>,
    timeout: Duration,
    mut predicate: F,
) -> Message
where
    F: FnMut(&Message) -> bool,
{
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            panic!("timed out waiting for expected message");
        }
        match receiver.try_recv() {
            Ok(message) => {
                if predicate(&message) {
                    return message;
                }
            }
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("bus closed while waiting for message"),
        }
    }
}

pub fn assert_no_message<F>(receiver: &mut Receiver<Message>, timeout: Duration, mut predicate: F)
where
    F: FnMut(&Message) -> bool,
{
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            return;
        }
        match receiver.try_recv() {
            Ok(message) => {
                if predicate(&message) {
                    panic!("received unexpected message: {:?}", message);
                }
            }
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return,
        }
    }
}

pub fn drain_messages(receiver: &mut Receiver<Message>) {
    loop {
        match receiver.try_recv() {
            Ok(_) => {}
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => break,
        }
    }
}
