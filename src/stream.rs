//! Frame assembly and the capture worker thread
//!
//! The bridge delivers video on bulk endpoint 0x81 as a stream of 2048-byte
//! packets, each carrying a 12-byte UVC-style header. A change of the FID
//! bit marks the start of a frame, the EOF bit marks its end; everything in
//! between is appended to the assembly buffer. Malformed packets discard the
//! in-progress frame without touching the next one.
//!
//! All blocking USB work runs on one dedicated, named OS thread (the only
//! background execution context in the driver). Completed frames cross to
//! consumers through a bounded channel of depth 2; when the consumer is
//! slow, the oldest frame is evicted rather than stalling the producer.

use crate::format;
use crate::modes::Mode;
use async_channel::{Receiver, Sender, TrySendError};
use rusb::{Context, DeviceHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Video bulk IN endpoint on the OV534
const VIDEO_ENDPOINT: u8 = 0x81;

/// Scratch buffers in the per-session transfer pool
const TRANSFER_COUNT: usize = 5;

/// Size of one bulk transfer request
const TRANSFER_SIZE: usize = 65536;

/// Bulk read timeout; bounds how long `stop()` waits for the worker to
/// notice the stop flag
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Depth of the completed-frame queue
const FRAME_QUEUE_DEPTH: usize = 2;

/// Payload packet geometry
const PACKET_SIZE: usize = 2048;
const HEADER_LEN: usize = 12;

// Header bit field (byte 1)
const UVC_STREAM_ERR: u8 = 0x40;
const UVC_STREAM_EOF: u8 = 0x02;
const UVC_STREAM_FID: u8 = 0x01;

/// One completed, format-converted frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub timestamp: SystemTime,
}

/// Bounded completed-frame queue with drop-oldest backpressure
struct FrameSink {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    dropped: u64,
}

impl FrameSink {
    fn push(&mut self, frame: Frame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                // Slow consumer: evict the oldest queued frame. Expected
                // steady-state behavior, not an error.
                let _ = self.rx.try_recv();
                self.dropped += 1;
                if self.dropped % 100 == 1 {
                    debug!("dropped {} frames under backpressure", self.dropped);
                }
                let _ = self.tx.try_send(frame);
            }
            Err(TrySendError::Closed(_)) => {
                // Session is stopping
            }
        }
    }
}

/// Reassembles payload packets into raw frames and converts them
struct FrameAssembler {
    mode: Mode,
    raw_size: usize,
    /// In-progress assembly, None between frames or after a discard
    assembly: Option<Assembly>,
    last_fid: Option<u8>,
    sink: FrameSink,
}

struct Assembly {
    buf: Vec<u8>,
    timestamp: SystemTime,
}

impl FrameAssembler {
    fn new(mode: Mode, sink: FrameSink) -> Self {
        Self {
            raw_size: mode.raw_frame_size(),
            mode,
            assembly: None,
            last_fid: None,
            sink,
        }
    }

    /// Scan one completed transfer's payload
    fn scan(&mut self, data: &[u8]) {
        for pkt in data.chunks(PACKET_SIZE) {
            self.packet(pkt);
        }
    }

    fn packet(&mut self, pkt: &[u8]) {
        if pkt.len() < HEADER_LEN || pkt[0] as usize != HEADER_LEN {
            self.discard("bad packet header");
            return;
        }
        let bits = pkt[1];
        if bits & UVC_STREAM_ERR != 0 {
            self.discard("payload error bit set");
            return;
        }

        let fid = bits & UVC_STREAM_FID;
        if self.last_fid != Some(fid) {
            // FID toggle: start of a new frame. An unfinished assembly at
            // this point was truncated and is dropped.
            if self.assembly.is_some() {
                self.discard("frame start while assembling");
            }
            self.last_fid = Some(fid);
            self.assembly = Some(Assembly {
                buf: Vec::with_capacity(self.raw_size),
                timestamp: SystemTime::now(),
            });
        }

        let overflow = match self.assembly.as_mut() {
            Some(assembly) => {
                let payload = &pkt[HEADER_LEN..];
                if assembly.buf.len() + payload.len() > self.raw_size {
                    true
                } else {
                    assembly.buf.extend_from_slice(payload);
                    false
                }
            }
            None => false,
        };
        if overflow {
            self.discard("frame overflow");
        }

        if bits & UVC_STREAM_EOF != 0 {
            self.finish();
        }
    }

    /// End-of-frame marker: queue the frame if the assembled length is
    /// exact, otherwise drop it. An EOF with no matching start is ignored.
    fn finish(&mut self) {
        let Some(assembly) = self.assembly.take() else {
            debug!("end marker with no frame in progress, ignored");
            return;
        };
        if assembly.buf.len() != self.raw_size {
            debug!(
                "truncated frame dropped: {} of {} bytes",
                assembly.buf.len(),
                self.raw_size
            );
            return;
        }
        let mut data = Vec::new();
        format::convert(
            self.mode.format,
            self.mode.width,
            self.mode.height,
            &assembly.buf,
            &mut data,
        );
        self.sink.push(Frame {
            data,
            timestamp: assembly.timestamp,
        });
    }

    fn discard(&mut self, reason: &str) {
        if self.assembly.take().is_some() {
            debug!("frame assembly discarded: {}", reason);
        }
    }
}

/// Handle to a running capture session
pub(crate) struct StreamWorker {
    stop: Arc<AtomicBool>,
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    join: Option<JoinHandle<()>>,
}

impl StreamWorker {
    /// Allocate the transfer pool and spawn the capture thread.
    ///
    /// Returns as soon as the thread is launched; never waits for data.
    pub fn start(handle: Arc<DeviceHandle<Context>>, mode: Mode) -> StreamWorker {
        let (tx, rx) = async_channel::bounded(FRAME_QUEUE_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));

        let sink = FrameSink {
            tx: tx.clone(),
            rx: rx.clone(),
            dropped: 0,
        };
        let assembler = FrameAssembler::new(mode, sink);
        // Transfer pool for the session, released when the thread exits
        let pool: Vec<Vec<u8>> = (0..TRANSFER_COUNT).map(|_| vec![0u8; TRANSFER_SIZE]).collect();

        let thread_stop = Arc::clone(&stop);
        let join = std::thread::Builder::new()
            .name("eye-capture".to_string())
            .spawn(move || capture_loop(handle, pool, assembler, thread_stop))
            .expect("failed to spawn capture thread");

        StreamWorker {
            stop,
            tx,
            rx,
            join: Some(join),
        }
    }

    /// Receiver for the completed-frame queue
    pub fn frames(&self) -> Receiver<Frame> {
        self.rx.clone()
    }

    /// Stop the session.
    ///
    /// Wakes any consumer blocked on the queue, then joins the worker
    /// thread; once this returns no completion code runs and the transfer
    /// pool has been released.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Closing the channel unblocks get_frame() callers with a failure
        // and discards unconsumed frames.
        self.tx.close();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("capture thread panicked");
            }
        }
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture thread body: cycle the transfer pool through bulk reads and feed
/// the assembler until the stop flag is raised.
fn capture_loop(
    handle: Arc<DeviceHandle<Context>>,
    mut pool: Vec<Vec<u8>>,
    mut assembler: FrameAssembler,
    stop: Arc<AtomicBool>,
) {
    info!("capture thread started");
    let mut slot = 0;

    while !stop.load(Ordering::Relaxed) {
        let buf = &mut pool[slot];
        match handle.read_bulk(VIDEO_ENDPOINT, buf, READ_TIMEOUT) {
            Ok(n) => {
                assembler.scan(&buf[..n]);
                slot = (slot + 1) % TRANSFER_COUNT;
            }
            Err(rusb::Error::Timeout) => {
                // No data in this interval; check the stop flag and retry
            }
            Err(rusb::Error::NoDevice) => {
                warn!("device disappeared, capture thread exiting");
                break;
            }
            Err(e) => {
                warn!("bulk read failed: {}", e);
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    if assembler.sink.dropped > 0 {
        debug!("session dropped {} frames in total", assembler.sink.dropped);
    }
    info!("capture thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;

    fn test_assembler(raw_size: usize) -> (FrameAssembler, Receiver<Frame>) {
        let (tx, rx) = async_channel::bounded(FRAME_QUEUE_DEPTH);
        let sink = FrameSink {
            tx,
            rx: rx.clone(),
            dropped: 0,
        };
        let mode = Mode {
            width: raw_size as u32,
            height: 1,
            fps: 30,
            format: OutputFormat::Bayer,
        };
        (FrameAssembler::new(mode, sink), rx)
    }

    /// Build one payload packet: valid header followed by `body`
    fn pkt(fid: u8, eof: bool, body: &[u8]) -> Vec<u8> {
        let mut p = vec![0u8; HEADER_LEN];
        p[0] = HEADER_LEN as u8;
        p[1] = 0x80 | fid | if eof { UVC_STREAM_EOF } else { 0 };
        p.extend_from_slice(body);
        p
    }

    #[test]
    fn test_single_frame_across_packets() {
        let (mut asm, rx) = test_assembler(4);
        asm.packet(&pkt(0, false, &[1, 2]));
        asm.packet(&pkt(0, false, &[3]));
        asm.packet(&pkt(0, true, &[4]));
        let frame = rx.try_recv().expect("frame not queued");
        assert_eq!(frame.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_malformed_middle_segment_dropped() {
        // [START, A, B, END, B(no START), C, END, START, D, END]
        // must yield exactly A+B and D.
        let (mut asm, rx) = test_assembler(4);
        asm.packet(&pkt(0, false, &[0xa, 0xa])); // START + A
        asm.packet(&pkt(0, true, &[0xb, 0xb])); // B + END
        asm.packet(&pkt(0, false, &[0xb, 0xb])); // continuation with no START
        asm.packet(&pkt(0, true, &[0xc, 0xc])); // C + END, orphaned
        asm.packet(&pkt(1, true, &[0xd; 4])); // START + D + END
        let first = rx.try_recv().expect("first frame missing");
        assert_eq!(first.data, vec![0xa, 0xa, 0xb, 0xb]);
        let second = rx.try_recv().expect("second frame missing");
        assert_eq!(second.data, vec![0xd; 4]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_truncated_frame_discarded() {
        let (mut asm, rx) = test_assembler(4);
        asm.packet(&pkt(0, false, &[1]));
        asm.packet(&pkt(0, true, &[2])); // only 2 of 4 bytes
        assert!(rx.try_recv().is_err());
        // The next frame assembles cleanly
        asm.packet(&pkt(1, true, &[9, 9, 9, 9]));
        assert_eq!(rx.try_recv().unwrap().data, vec![9, 9, 9, 9]);
    }

    #[test]
    fn test_error_bit_discards_in_progress_frame() {
        let (mut asm, rx) = test_assembler(4);
        asm.packet(&pkt(0, false, &[1, 2]));
        let mut bad = pkt(0, false, &[3, 4]);
        bad[1] |= UVC_STREAM_ERR;
        asm.packet(&bad);
        asm.packet(&pkt(0, true, &[5, 6])); // rest of the corrupted frame
        assert!(rx.try_recv().is_err());
        asm.packet(&pkt(1, true, &[7, 7, 7, 7]));
        assert_eq!(rx.try_recv().unwrap().data, vec![7, 7, 7, 7]);
    }

    #[test]
    fn test_overflow_discards_frame() {
        let (mut asm, rx) = test_assembler(2);
        asm.packet(&pkt(0, false, &[1, 2]));
        asm.packet(&pkt(0, true, &[3])); // would exceed 2 bytes
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_queue_evicts_oldest_when_full() {
        let (mut asm, rx) = test_assembler(1);
        for v in [1u8, 2, 3] {
            let fid = v & 1;
            asm.packet(&pkt(fid, true, &[v]));
        }
        // Depth-2 queue: frame 1 was evicted
        assert_eq!(rx.try_recv().unwrap().data, vec![2]);
        assert_eq!(rx.try_recv().unwrap().data, vec![3]);
        assert!(rx.try_recv().is_err());
        assert_eq!(asm.sink.dropped, 1);
    }

    #[test]
    fn test_closed_queue_unblocks_consumer() {
        let (tx, rx) = async_channel::bounded::<Frame>(FRAME_QUEUE_DEPTH);
        let waiter = std::thread::spawn(move || rx.recv_blocking());
        std::thread::sleep(Duration::from_millis(50));
        tx.close();
        let result = waiter.join().expect("consumer thread panicked");
        assert!(result.is_err());
    }

    #[test]
    fn test_short_packet_ignored_safely() {
        let (mut asm, rx) = test_assembler(2);
        asm.packet(&[12]); // shorter than the header
        asm.packet(&pkt(0, true, &[1, 2]));
        assert_eq!(rx.try_recv().unwrap().data, vec![1, 2]);
    }
}
