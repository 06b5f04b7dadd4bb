//! In-memory stand-ins for the network seams, used by unit tests.

use std::sync::{Arc, Mutex};

use peartalk_shared::{Message, MessageBody, Topic, UserId};

use crate::error::ConnectionFault;
use crate::pending::Outbound;
use crate::stream::{PeerStream, Rendezvous};

pub(crate) fn user(name: &str) -> UserId {
    UserId::parse(name).unwrap()
}

pub(crate) fn text(from: &str, to: &str, ts: i64, content: &str) -> Message {
    Message {
        body: MessageBody::text(content),
        sender: user(from),
        recipient: user(to),
        timestamp: ts,
    }
}

pub(crate) fn outbound(content: &str, ts: i64) -> Outbound {
    Outbound::encode(text("alice", "bob", ts, content)).unwrap()
}

#[derive(Default)]
struct RecorderState {
    frames: Vec<Vec<u8>>,
    budget: Option<usize>,
    /// Report an exhausted budget as back-pressure instead of a failure.
    busy: bool,
    closed: bool,
}

/// Records every frame written through the streams it hands out.
#[derive(Clone, Default)]
pub(crate) struct StreamRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl StreamRecorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Streams from this recorder accept `writes` frames, then fail.
    pub(crate) fn failing_after(writes: usize) -> Self {
        let recorder = Self::default();
        recorder.state.lock().unwrap().budget = Some(writes);
        recorder
    }

    /// Streams from this recorder accept `writes` frames, then report busy
    /// until [`StreamRecorder::accept`] is called.
    pub(crate) fn busy_after(writes: usize) -> Self {
        let recorder = Self::failing_after(writes);
        recorder.state.lock().unwrap().busy = true;
        recorder
    }

    /// Accept `writes` more frames, or any number with `None`.
    pub(crate) fn accept(&self, writes: Option<usize>) {
        self.state.lock().unwrap().budget = writes;
    }

    pub(crate) fn stream(&self) -> Box<dyn PeerStream> {
        Box::new(RecorderStream {
            state: self.state.clone(),
        })
    }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.state
            .lock()
            .unwrap()
            .frames
            .iter()
            .map(|f| Message::from_frame(f).unwrap())
            .collect()
    }

    pub(crate) fn contents(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|m| m.body.content().to_string())
            .collect()
    }

    /// The remote end went away; later writes fail with `Closed`.
    pub(crate) fn close_stream(&self) {
        self.state.lock().unwrap().closed = true;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

struct RecorderStream {
    state: Arc<Mutex<RecorderState>>,
}

impl PeerStream for RecorderStream {
    fn write(&mut self, frame: &[u8]) -> Result<(), ConnectionFault> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(ConnectionFault::Closed);
        }
        match state.budget {
            Some(0) if state.busy => return Err(ConnectionFault::Busy),
            Some(0) => return Err(ConnectionFault::Write("peer went away".into())),
            Some(n) => state.budget = Some(n - 1),
            None => {}
        }
        state.frames.push(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

/// Records topic membership changes.
#[derive(Clone, Default)]
pub(crate) struct TopicRecorder {
    log: Arc<Mutex<Vec<(bool, Topic)>>>,
}

impl TopicRecorder {
    pub(crate) fn rendezvous(&self) -> Box<dyn Rendezvous> {
        Box::new(RecorderRendezvous {
            log: self.log.clone(),
        })
    }

    pub(crate) fn joined(&self) -> Vec<Topic> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(join, _)| *join)
            .map(|(_, t)| *t)
            .collect()
    }

    pub(crate) fn left(&self) -> Vec<Topic> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(join, _)| !*join)
            .map(|(_, t)| *t)
            .collect()
    }
}

struct RecorderRendezvous {
    log: Arc<Mutex<Vec<(bool, Topic)>>>,
}

impl Rendezvous for RecorderRendezvous {
    fn join(&mut self, topic: &Topic) -> Result<(), ConnectionFault> {
        self.log.lock().unwrap().push((true, *topic));
        Ok(())
    }

    fn leave(&mut self, topic: &Topic) {
        self.log.lock().unwrap().push((false, *topic));
    }
}
