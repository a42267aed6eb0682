//! In-memory script host for engine tests

#![allow(dead_code)]

use logias_core::{
    CallbackError, CallbackResult, Config, ConfigError, HostLoader, Loaded, Notifiers, ScriptHost,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum V {
    Nil,
    Bool(bool),
    Str(String),
    /// Target State, identified by the initializer call that created it
    State(u64),
}

type CallbackFn = dyn Fn(&[V]) -> Result<V, String> + Send + Sync;

#[derive(Clone)]
pub struct Cb(Arc<CallbackFn>);

impl Cb {
    pub fn new(f: impl Fn(&[V]) -> Result<V, String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn returning(value: V) -> Self {
        Self::new(move |_| Ok(value.clone()))
    }

    pub fn failing(message: &'static str) -> Self {
        Self::new(move |_| Err(message.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MockHost {
    downtime: AtomicBool,
}

impl MockHost {
    pub fn downtime_flag(&self) -> bool {
        self.downtime.load(Ordering::SeqCst)
    }
}

impl ScriptHost for MockHost {
    type Value = V;
    type Callback = Cb;

    fn call(&self, callback: &Cb, args: Vec<V>) -> CallbackResult<V> {
        (callback.0)(&args).map_err(CallbackError::Raised)
    }

    fn nil(&self) -> V {
        V::Nil
    }

    fn string(&self, text: &str) -> CallbackResult<V> {
        Ok(V::Str(text.to_string()))
    }

    fn truthy(&self, value: &V) -> bool {
        !matches!(value, V::Nil | V::Bool(false))
    }

    fn render(&self, value: &V) -> String {
        match value {
            V::Nil => "nil".to_string(),
            V::Bool(b) => b.to_string(),
            V::Str(s) => s.clone(),
            V::State(id) => format!("state#{}", id),
        }
    }

    fn set_downtime(&self, in_downtime: bool) {
        self.downtime.store(in_downtime, Ordering::SeqCst);
    }
}

/// Records callback invocations as strings
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Callback recording `name:<argument at index>`
    pub fn callback(&self, name: &'static str, index: usize) -> Cb {
        let calls = Arc::clone(&self.calls);
        Cb::new(move |args| {
            let text = match args.get(index) {
                Some(V::Str(s)) => s.clone(),
                Some(other) => format!("{:?}", other),
                None => "-".to_string(),
            };
            calls.lock().push(format!("{}:{}", name, text));
            Ok(V::Nil)
        })
    }

    /// Callback recording `name(<every argument>)`
    pub fn arguments(&self, name: &'static str) -> Cb {
        let calls = Arc::clone(&self.calls);
        Cb::new(move |args| {
            let rendered: Vec<String> = args.iter().map(|a| format!("{:?}", a)).collect();
            calls.lock().push(format!("{}({})", name, rendered.join(", ")));
            Ok(V::Nil)
        })
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock())
    }
}

/// Initializer handing out `State(1)`, `State(2)`, ...
pub fn counting_initializer() -> (Cb, Arc<AtomicU64>) {
    let counter = Arc::new(AtomicU64::new(0));
    let c = Arc::clone(&counter);
    let cb = Cb::new(move |_| Ok(V::State(c.fetch_add(1, Ordering::SeqCst) + 1)));
    (cb, counter)
}

/// Downtime callback driven by a flag
pub fn downtime_switch() -> (Cb, Arc<AtomicBool>) {
    let flag = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&flag);
    (Cb::new(move |_| Ok(V::Bool(f.load(Ordering::SeqCst)))), flag)
}

pub fn config_with_default(default: Cb) -> Config<Cb> {
    Config::new(Notifiers::new(default))
}

/// Loader rebuilding the same configuration on every load
pub struct MockLoader {
    build: Box<dyn Fn() -> Config<Cb> + Send + Sync>,
    loads: AtomicUsize,
}

impl MockLoader {
    pub fn new(build: impl Fn() -> Config<Cb> + Send + Sync + 'static) -> Self {
        Self {
            build: Box::new(build),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl HostLoader for MockLoader {
    type Host = MockHost;

    fn load(&self) -> Result<Loaded<MockHost>, ConfigError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Loaded {
            config: (self.build)().finish()?,
            host: MockHost::default(),
        })
    }
}
