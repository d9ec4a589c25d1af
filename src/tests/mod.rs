mod test_client;
mod test_codec;

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use crate::server::context::RegisterStore;
use crate::server::Responder;
use crate::transport::Transport;
use crate::*;
use crc16::*;

/// Append a CRC computed by the crc16 crate
///
/// also checks guess_request_frame_len
fn gen_rtu_frame(data: &[u8]) -> Vec<u8> {
    let mut frame = data.to_vec();
    frame.extend_from_slice(&State::<MODBUS>::calculate(data).to_le_bytes());
    assert_eq!(guess_request_frame_len(&frame).unwrap(), frame.len());
    frame
}

fn check_rtu_response(result: &[u8], expected: &[u8]) {
    assert_eq!(&result[..result.len() - 2], expected);
    let result_crc = u16::from_le_bytes([result[result.len() - 2], result[result.len() - 1]]);
    assert_eq!(result_crc, State::<MODBUS>::calculate(expected));
    assert_eq!(guess_response_frame_len(result).unwrap(), result.len());
}

/// Transport replaying canned chunks
///
/// Each write releases the next reply set into the incoming queue. An empty queue behaves like a
/// silent line: the read sleeps for `max_wait` and returns nothing.
#[derive(Default)]
struct ScriptedTransport {
    incoming: VecDeque<Vec<u8>>,
    replies: VecDeque<Vec<Vec<u8>>>,
    written: Vec<Vec<u8>>,
    reads: usize,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self::default()
    }

    /// Chunks released by the next write
    fn reply(mut self, chunks: &[&[u8]]) -> Self {
        self.replies
            .push_back(chunks.iter().map(|c| c.to_vec()).collect());
        self
    }

    /// Chunk already on the line
    fn push_incoming(&mut self, chunk: &[u8]) {
        self.incoming.push_back(chunk.to_vec());
    }
}

impl Transport for ScriptedTransport {
    fn read_bytes(&mut self, max_wait: Duration) -> Result<Vec<u8>, ErrorKind> {
        self.reads += 1;
        if let Some(chunk) = self.incoming.pop_front() {
            Ok(chunk)
        } else {
            thread::sleep(max_wait);
            Ok(Vec::new())
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
        self.written.push(data.to_vec());
        if let Some(chunks) = self.replies.pop_front() {
            self.incoming.extend(chunks);
        }
        Ok(())
    }
}

/// Requester side of an in-process bus with a responder on the other end
struct LoopbackTransport<S: RegisterStore> {
    responder: Responder,
    store: S,
    pending: VecDeque<Vec<u8>>,
}

impl<S: RegisterStore> LoopbackTransport<S> {
    fn new(unit_id: UnitId, store: S) -> Self {
        Self {
            responder: Responder::new(&ResponderConfig::new(unit_id)).unwrap(),
            store,
            pending: VecDeque::new(),
        }
    }
}

impl<S: RegisterStore> Transport for LoopbackTransport<S> {
    fn read_bytes(&mut self, max_wait: Duration) -> Result<Vec<u8>, ErrorKind> {
        if let Some(chunk) = self.pending.pop_front() {
            Ok(chunk)
        } else {
            thread::sleep(max_wait);
            Ok(Vec::new())
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
        if let Some(response) = self.responder.process_frame(data, &mut self.store) {
            self.pending.push_back(response.to_vec());
        }
        Ok(())
    }
}
