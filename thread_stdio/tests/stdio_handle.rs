mod common;

use common::{config, init_logging, FaultyBuf, LONG_WAIT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use thread_stdio::{
    AccessMode, FileOps, IoMode, LifecycleState, OpenFlags, StdSpawner, StdioError,
    ThreadWithStdio,
};

fn rw_flags() -> OpenFlags {
    OpenFlags::new(AccessMode::ReadWrite)
}

#[test]
fn test_capacity_backpressure_sequence() {
    init_logging();
    let (go_tx, go_rx) = mpsc::channel::<usize>();
    let (got_tx, got_rx) = mpsc::channel::<Vec<u8>>();

    let mut file = ThreadWithStdio::open(
        &StdSpawner,
        config(8),
        None,
        Box::new(move |thr| {
            for n in go_rx {
                let mut buf = vec![0u8; n];
                let got = thr.stdio().read(&mut buf, IoMode::Blocking).unwrap();
                buf.truncate(got);
                got_tx.send(buf).unwrap();
            }
            0
        }),
    )
    .unwrap();
    file.set_nonblocking(true);

    assert_eq!(file.write(b"ABCDEFGHIJ"), Ok(8));
    assert_eq!(file.write(b"K"), Err(StdioError::WouldBlock));

    go_tx.send(4).unwrap();
    assert_eq!(got_rx.recv_timeout(LONG_WAIT).unwrap(), b"ABCD");

    assert_eq!(file.write(b"IJ"), Ok(2));
    go_tx.send(16).unwrap();
    assert_eq!(got_rx.recv_timeout(LONG_WAIT).unwrap(), b"EFGHIJ");

    drop(go_tx);
    drop(file);
}

#[test]
fn test_nonblocking_would_block_leaves_buffers_unchanged() {
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (got_tx, got_rx) = mpsc::channel::<Vec<u8>>();

    let mut file = ThreadWithStdio::open(
        &StdSpawner,
        config(4),
        None,
        Box::new(move |thr| {
            if go_rx.recv().is_ok() {
                let mut buf = [0u8; 16];
                let n = thr.stdio().read(&mut buf, IoMode::NonBlocking).unwrap();
                got_tx.send(buf[..n].to_vec()).unwrap();
            }
            0
        }),
    )
    .unwrap();
    file.set_nonblocking(true);

    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf), Err(StdioError::WouldBlock));

    assert_eq!(file.write(b"abcd"), Ok(4));
    assert_eq!(file.write(b"e"), Err(StdioError::WouldBlock));
    assert_eq!(file.thread().stdio().input().len(), 4);

    go_tx.send(()).unwrap();
    assert_eq!(got_rx.recv_timeout(LONG_WAIT).unwrap(), b"abcd");
    drop(file);
}

#[test]
fn test_read_returns_eof_when_worker_finishes() {
    init_logging();
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        None,
        Box::new(|_thr| {
            thread::sleep(Duration::from_millis(50));
            5
        }),
    )
    .unwrap();

    let started = Instant::now();
    let mut buf = [0u8; 8];
    assert_eq!(file.read(&mut buf), Ok(0));
    assert!(started.elapsed() < LONG_WAIT);
    assert_eq!(file.thread().exit_code(), 5);
    assert_eq!(file.thread().state(), LifecycleState::Closed);
}

#[test]
fn test_release_wakes_blocked_worker() {
    let (res_tx, res_rx) = mpsc::channel();
    let exits = Arc::new(AtomicUsize::new(0));
    let exits_in_cb = Arc::clone(&exits);

    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        Some(Box::new(move |thr: &ThreadWithStdio| {
            assert_eq!(thr.state(), LifecycleState::Closed);
            exits_in_cb.fetch_add(1, Ordering::SeqCst);
        })),
        Box::new(move |thr| {
            let mut buf = [0u8; 8];
            let res = thr.stdio().read(&mut buf, IoMode::Blocking);
            res_tx.send(res).unwrap();
            9
        }),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(30));
    drop(file);

    assert_eq!(res_rx.recv_timeout(LONG_WAIT).unwrap(), Err(StdioError::Closed));
    assert_eq!(exits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_worker_write_larger_than_capacity() {
    const TOTAL: usize = 100_000;
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(4096),
        None,
        Box::new(|thr| {
            let data: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
            for chunk in data.chunks(1000) {
                assert_eq!(thr.stdio().write(chunk, IoMode::Blocking), Ok(chunk.len()));
            }
            0
        }),
    )
    .unwrap();

    let mut out = Vec::with_capacity(TOTAL);
    let mut buf = [0u8; 777];
    loop {
        let n = file.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out.len(), TOTAL);
    assert!(out.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8));
}

#[test]
fn test_blocking_handle_write_completes_with_drain() {
    const TOTAL: usize = 20_000;
    let (got_tx, got_rx) = mpsc::channel();

    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(4096),
        None,
        Box::new(move |thr| {
            let mut got = 0;
            let mut buf = [0u8; 100];
            while got < TOTAL {
                got += thr.stdio().read(&mut buf, IoMode::Blocking).unwrap();
            }
            got_tx.send(got).unwrap();
            0
        }),
    )
    .unwrap();

    let data = vec![b'x'; TOTAL];
    assert_eq!(file.write(&data), Ok(TOTAL));
    assert_eq!(got_rx.recv_timeout(LONG_WAIT).unwrap(), TOTAL);
}

#[test]
fn test_echo_preserves_bytes_under_concurrency() {
    const TOTAL: usize = 50_000;
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(512),
        None,
        Box::new(|thr| {
            let mut buf = [0u8; 300];
            loop {
                match thr.stdio().read(&mut buf, IoMode::Blocking) {
                    Ok(n) => {
                        if thr.stdio().write(&buf[..n], IoMode::Blocking).is_err() {
                            break;
                        }
                    }
                    Err(StdioError::Closed) => break,
                    Err(e) => panic!("unexpected worker error: {e}"),
                }
            }
            0
        }),
    )
    .unwrap();

    let data: Vec<u8> = (0..TOTAL).map(|i| (i * 7 % 256) as u8).collect();
    let echoed = thread::scope(|s| {
        s.spawn(|| {
            for chunk in data.chunks(1234) {
                assert_eq!(file.write(chunk), Ok(chunk.len()));
            }
        });
        let reader = s.spawn(|| {
            let mut out = Vec::with_capacity(TOTAL);
            let mut buf = [0u8; 1000];
            while out.len() < TOTAL {
                let n = file.read(&mut buf).unwrap();
                assert!(n > 0);
                out.extend_from_slice(&buf[..n]);
            }
            out
        });
        reader.join().unwrap()
    });
    assert_eq!(echoed, data);
}

#[test]
fn test_read_line_returns_partial_line_once() {
    let (line_tx, line_rx) = mpsc::channel();
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        None,
        Box::new(move |thr| {
            let mut buf = [0u8; 32];
            loop {
                let res = thr.stdio().read_line(&mut buf).map(|n| buf[..n].to_vec());
                let closed = res.is_err();
                line_tx.send(res).unwrap();
                if closed {
                    return 0;
                }
            }
        }),
    )
    .unwrap();

    assert_eq!(file.write(b"one\ntwo\nthr"), Ok(11));
    assert_eq!(line_rx.recv_timeout(LONG_WAIT).unwrap(), Ok(b"one\n".to_vec()));
    assert_eq!(line_rx.recv_timeout(LONG_WAIT).unwrap(), Ok(b"two\n".to_vec()));

    drop(file);
    assert_eq!(line_rx.recv_timeout(LONG_WAIT).unwrap(), Ok(b"thr".to_vec()));
    assert_eq!(line_rx.recv_timeout(LONG_WAIT).unwrap(), Err(StdioError::Closed));
}

#[test]
fn test_read_line_stops_when_buffer_full() {
    let (line_tx, line_rx) = mpsc::channel();
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        None,
        Box::new(move |thr| {
            let mut buf = [0u8; 4];
            for _ in 0..3 {
                let n = thr.stdio().read_line(&mut buf).unwrap();
                line_tx.send(buf[..n].to_vec()).unwrap();
            }
            0
        }),
    )
    .unwrap();

    assert_eq!(file.write(b"abcdefgh\n"), Ok(9));
    assert_eq!(line_rx.recv_timeout(LONG_WAIT).unwrap(), b"abcd");
    assert_eq!(line_rx.recv_timeout(LONG_WAIT).unwrap(), b"efgh");
    assert_eq!(line_rx.recv_timeout(LONG_WAIT).unwrap(), b"\n");
    drop(file);
}

#[test]
fn test_fault_in_caller_memory() {
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        None,
        Box::new(move |thr| {
            thr.stdio().write(b"hello world", IoMode::Blocking).unwrap();
            let _ = go_rx.recv();
            0
        }),
    )
    .unwrap();
    let thr = file.thread();

    let mut unmapped = FaultyBuf::zeroed(8, 0);
    assert_eq!(thr.read(&mut unmapped, rw_flags()), Err(StdioError::Fault));

    let mut partial = FaultyBuf::zeroed(8, 5);
    assert_eq!(thr.read(&mut partial, rw_flags()), Ok(5));
    assert_eq!(&partial.data[..5], b"hello");

    let mut rest = [0u8; 16];
    assert_eq!(file.read(&mut rest), Ok(6));
    assert_eq!(&rest[..6], b" world");

    assert_eq!(
        thr.write(&FaultyBuf::new(b"input".to_vec(), 0), rw_flags()),
        Err(StdioError::Fault)
    );
    assert_eq!(thr.write(&FaultyBuf::new(b"input".to_vec(), 3), rw_flags()), Ok(3));
    assert_eq!(thr.stdio().input().len(), 3);

    go_tx.send(()).unwrap();
}

#[test]
fn test_interrupt_aborts_blocked_read() {
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        None,
        Box::new(move |thr| {
            let _ = go_rx.recv();
            thr.stdio().write(b"late", IoMode::Blocking).unwrap();
            0
        }),
    )
    .unwrap();

    thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut buf = [0u8; 8];
            file.read(&mut buf)
        });
        thread::sleep(Duration::from_millis(50));
        file.interrupt();
        assert_eq!(reader.join().unwrap(), Err(StdioError::Interrupted));
    });

    go_tx.send(()).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(file.read(&mut buf), Ok(4));
    assert_eq!(&buf[..4], b"late");
}

#[test]
fn test_worker_panic_closes_channel() {
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        None,
        Box::new(|_thr: &ThreadWithStdio| -> i32 { panic!("worker failure") }),
    )
    .unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(file.read(&mut buf), Ok(0));
    assert_eq!(file.write(b"x"), Err(StdioError::BrokenPipe));
}

#[test]
fn test_interrupt_with_no_waiter_does_not_fail_later_read() {
    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        None,
        Box::new(|thr| {
            thr.stdio().write(b"data", IoMode::Blocking).unwrap();
            0
        }),
    )
    .unwrap();

    file.interrupt();
    let mut buf = [0u8; 8];
    assert_eq!(file.read(&mut buf), Ok(4));
    assert_eq!(&buf[..4], b"data");
}

#[test]
fn test_worker_releasing_itself_defers_cleanup() {
    let (seen_tx, seen_rx) = mpsc::channel();
    let (exit_tx, exit_rx) = mpsc::channel();
    let exits = Arc::new(AtomicUsize::new(0));
    let exits_in_cb = Arc::clone(&exits);

    let file = ThreadWithStdio::open(
        &StdSpawner,
        config(64),
        Some(Box::new(move |thr: &ThreadWithStdio| {
            exits_in_cb.fetch_add(1, Ordering::SeqCst);
            exit_tx.send(thr.exit_code()).unwrap();
        })),
        Box::new(move |thr| {
            FileOps::release(thr);
            thread::sleep(Duration::from_millis(30));
            seen_tx
                .send((
                    thr.state(),
                    thr.should_stop(),
                    exits.load(Ordering::SeqCst),
                    thr.stdio().write(b"x", IoMode::NonBlocking),
                ))
                .unwrap();
            4
        }),
    )
    .unwrap();

    assert_eq!(
        seen_rx.recv_timeout(LONG_WAIT).unwrap(),
        (LifecycleState::Closed, true, 0, Err(StdioError::BrokenPipe))
    );
    assert_eq!(exit_rx.recv_timeout(LONG_WAIT).unwrap(), 4);

    let started = Instant::now();
    while file.thread().state() != LifecycleState::Released {
        assert!(started.elapsed() < LONG_WAIT);
        thread::sleep(Duration::from_millis(5));
    }
    drop(file);
    assert!(exit_rx.recv_timeout(Duration::from_millis(50)).is_err());
}
