//! Synthetic workload for `stackcast demo`.
//!
//! A few threads serve fake requests forever. Each request parses, then
//! either computes (with a recursive checksum) or renders, so snapshots
//! show a shared helper, recursion, and uneven own times:
//!
//! ```text
//! demo::handle_request
//! ├── demo::parse
//! ├── demo::compute
//! │   └── demo::checksum ── demo::checksum ── demo::checksum
//! └── demo::render
//! ```

use std::hint::black_box;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::domain::{ActivationKey, CallSite};
use crate::profiling::{ContextStack, StackRegistry, Tracer};

const CHECKSUM_DEPTH: u32 = 3;
const IDLE_BETWEEN_REQUESTS: Duration = Duration::from_millis(2);

/// How the workload reports its calls.
#[derive(Debug, Clone)]
pub enum Probe {
    /// Every entry and exit goes through a tracer.
    Traced(Tracer),
    /// Frames are pushed on shadow stacks a sampler reads.
    Sampled(Arc<StackRegistry>),
}

/// Running workload threads.
#[derive(Debug)]
pub struct Workload {
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<u64>>,
}

impl Workload {
    /// Start `threads` request loops.
    ///
    /// # Errors
    /// Thread spawn failure.
    pub fn spawn(probe: &Probe, threads: usize) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(threads);
        for n in 0..threads {
            let recorder = match probe {
                Probe::Traced(tracer) => Recorder::Traced(tracer.clone()),
                Probe::Sampled(registry) => Recorder::Sampled(registry.context()),
            };
            let stop = Arc::clone(&stop);
            handles.push(
                thread::Builder::new()
                    .name(format!("stackcast-demo-{n}"))
                    .spawn(move || serve(&recorder, &stop))?,
            );
        }
        Ok(Self { stop, threads: handles })
    }

    /// Stop every loop and return the number of requests served.
    #[must_use]
    pub fn stop(self) -> u64 {
        self.stop.store(true, Ordering::Relaxed);
        self.threads.into_iter().filter_map(|t| t.join().ok()).sum()
    }
}

struct Sites {
    handle_request: CallSite,
    parse: CallSite,
    compute: CallSite,
    checksum: CallSite,
    render: CallSite,
}

impl Sites {
    fn new() -> Self {
        let site = |name: &str, line| CallSite::new(name, "src/cli/workload.rs", line);
        Self {
            handle_request: site("demo::handle_request", 1),
            parse: site("demo::parse", 2),
            compute: site("demo::compute", 3),
            checksum: site("demo::checksum", 4),
            render: site("demo::render", 5),
        }
    }
}

enum Recorder {
    Traced(Tracer),
    Sampled(ContextStack),
}

impl Recorder {
    /// Run `body` as a call to `site` made from `path`.
    fn call<R>(&self, path: &mut Vec<CallSite>, site: &CallSite, body: impl FnOnce(&mut Vec<CallSite>) -> R) -> R {
        path.push(site.clone());
        let result = match self {
            Self::Traced(tracer) => {
                let key = ActivationKey::current_thread(path.len());
                tracer.enter(path.as_slice(), key);
                let result = body(path);
                tracer.exit(path.as_slice(), key);
                result
            }
            Self::Sampled(context) => {
                let _frame = context.push(site.clone());
                body(path)
            }
        };
        path.pop();
        result
    }
}

fn serve(recorder: &Recorder, stop: &AtomicBool) -> u64 {
    let sites = Sites::new();
    let mut path = Vec::new();
    let mut served = 0u64;
    while !stop.load(Ordering::Relaxed) {
        recorder.call(&mut path, &sites.handle_request, |path| handle_request(recorder, &sites, path, served));
        served += 1;
        thread::sleep(IDLE_BETWEEN_REQUESTS);
    }
    served
}

fn handle_request(recorder: &Recorder, sites: &Sites, path: &mut Vec<CallSite>, n: u64) {
    recorder.call(path, &sites.parse, |_| spin(Duration::from_micros(200)));
    if n % 3 == 0 {
        recorder.call(path, &sites.compute, |path| {
            spin(Duration::from_micros(300));
            checksum(recorder, sites, path, CHECKSUM_DEPTH)
        });
    } else {
        recorder.call(path, &sites.render, |_| spin(Duration::from_micros(300)));
    }
}

fn checksum(recorder: &Recorder, sites: &Sites, path: &mut Vec<CallSite>, depth: u32) -> u64 {
    recorder.call(path, &sites.checksum, |path| {
        let own = spin(Duration::from_micros(100));
        if depth > 1 {
            own ^ checksum(recorder, sites, path, depth - 1)
        } else {
            own
        }
    })
}

/// Burn CPU for roughly `duration`.
fn spin(duration: Duration) -> u64 {
    let started = Instant::now();
    let mut acc = 0u64;
    while started.elapsed() < duration {
        for i in 0..64u64 {
            acc = black_box(acc.wrapping_mul(31).wrapping_add(i));
        }
    }
    acc
}
