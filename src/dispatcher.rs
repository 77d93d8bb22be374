//! Dispatcher - process-wide fan-out of event records to sinks

use crate::broker::BrokerConnector;
use crate::broker_sink::BrokerSink;
use crate::config::LogConfig;
use crate::console::{ConsoleSink, PrintSink};
use crate::file::FileSink;
use crate::formatter::{Formatter, FormatterAssignment, FormatterKind};
use crate::level::Level;
use crate::publisher::{BrokerPublisher, Sleeper};
use crate::record::EventRecord;
use crate::sink::Sink;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

/// Dispatcher-specific errors
#[derive(thiserror::Error, Debug)]
pub enum DispatcherError {
    #[error("dispatcher is already initialized")]
    AlreadyInitialized,

    #[error("dispatcher has been shut down")]
    ShutDown,

    #[error("a sink named '{0}' is already registered")]
    DuplicateSink(String),

    #[error("broker sink unavailable: {0}")]
    BrokerUnavailable(String),
}

/// Lifecycle of a [`Dispatcher`]. `ShutDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Uninitialized,
    Initialized,
    ShutDown,
}

/// A sink together with its severity floor and formatter.
pub struct SinkRegistration {
    name: String,
    sink: Arc<dyn Sink>,
    floor: Level,
    formatter: Formatter,
    live: AtomicBool,
}

impl SinkRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn floor(&self) -> Level {
        self.floor
    }

    pub fn assignment(&self) -> &FormatterAssignment {
        self.formatter.assignment()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

type Writer = Box<dyn Write + Send>;

/// Injection points used while opening the configured sinks.
#[derive(Default)]
struct SinkOptions {
    connector: Option<Arc<dyn BrokerConnector>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    stdout: Option<Writer>,
    stderr: Option<Writer>,
}

/// Builder for an initialized [`Dispatcher`] with substituted I/O.
pub struct DispatcherBuilder {
    config: LogConfig,
    options: SinkOptions,
}

impl DispatcherBuilder {
    pub fn new(config: LogConfig) -> Self {
        Self {
            config,
            options: SinkOptions::default(),
        }
    }

    /// Transport used by the broker sink instead of the AMQP client.
    pub fn connector(mut self, connector: Arc<dyn BrokerConnector>) -> Self {
        self.options.connector = Some(connector);
        self
    }

    /// Sleeper used by the broker publisher between reconnect attempts.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.options.sleeper = Some(sleeper);
        self
    }

    /// Writers replacing stdout and stderr for the console sink. The
    /// print sink uses `out`.
    pub fn console_writers(mut self, out: Writer, err: Writer) -> Self {
        self.options.stdout = Some(out);
        self.options.stderr = Some(err);
        self
    }

    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let dispatcher = Dispatcher::new(self.config);
        dispatcher.initialize_with(self.options)?;
        Ok(dispatcher)
    }
}

/// Routes every [`EventRecord`] to all live sinks whose floor it meets.
///
/// Sinks are called in registration order on the emitting thread. A sink
/// that fails or panics is reported on stderr and skipped; the emitter
/// never sees the failure.
pub struct Dispatcher {
    config: LogConfig,
    state: RwLock<DispatcherState>,
    closing: AtomicBool,
    initializing: Mutex<()>,
    registrations: RwLock<Arc<Vec<Arc<SinkRegistration>>>>,
}

impl Dispatcher {
    /// Create an uninitialized dispatcher; it drops every event until
    /// [`initialize`](Self::initialize) opens its sinks.
    pub fn new(config: LogConfig) -> Self {
        Self {
            config,
            state: RwLock::new(DispatcherState::Uninitialized),
            closing: AtomicBool::new(false),
            initializing: Mutex::new(()),
            registrations: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn builder(config: LogConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Active level; nothing below it reaches any configured sink.
    pub fn level(&self) -> Level {
        self.config.level
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the sinks selected by the configuration.
    ///
    /// Configured sinks are delivered to first, followed by any sink
    /// registered before this call.
    pub fn initialize(&self) -> Result<(), DispatcherError> {
        self.initialize_with(SinkOptions::default())
    }

    fn initialize_with(&self, mut options: SinkOptions) -> Result<(), DispatcherError> {
        let _initializing = self.initializing.lock().unwrap_or_else(PoisonError::into_inner);
        match self.state() {
            DispatcherState::Uninitialized => {}
            DispatcherState::Initialized => return Err(DispatcherError::AlreadyInitialized),
            DispatcherState::ShutDown => return Err(DispatcherError::ShutDown),
        }

        let config = &self.config;
        let debug_context = config.level == Level::Debug;
        let kind = FormatterKind::select(config.json, config.structured_envelope);

        let console_assignment = FormatterAssignment {
            kind,
            color: config.color,
            pretty: config.pretty,
            debug_context,
        };
        let file_assignment = FormatterAssignment {
            debug_context,
            ..FormatterAssignment::plain()
        };
        let broker_assignment = FormatterAssignment {
            kind,
            debug_context,
            ..FormatterAssignment::plain()
        };

        // Build everything first so a failure leaves the dispatcher empty.
        let mut sinks: Vec<(&str, Arc<dyn Sink>, FormatterAssignment)> = Vec::new();

        if config.print {
            let sink = match options.stdout.take() {
                Some(out) => PrintSink::with_writer(out),
                None => PrintSink::new(),
            };
            sinks.push(("print", Arc::new(sink) as Arc<dyn Sink>, console_assignment));
        } else {
            let sink = match (options.stdout.take(), options.stderr.take()) {
                (Some(out), Some(err)) => ConsoleSink::with_writers(out, err),
                _ => ConsoleSink::new(),
            };
            sinks.push(("console", Arc::new(sink) as Arc<dyn Sink>, console_assignment));
        }

        if config.to_file {
            sinks.push(("file", Arc::new(FileSink::new(config.file_path())) as Arc<dyn Sink>, file_assignment));
        }

        if config.to_broker {
            let connector = match options.connector.take() {
                Some(connector) => connector,
                None => default_connector()?,
            };
            let mut publisher = BrokerPublisher::new(config.broker.clone(), connector);
            if let Some(sleeper) = options.sleeper.take() {
                publisher = publisher.with_sleeper(sleeper);
            }
            let sink = BrokerSink::new(Arc::new(publisher));
            sinks.push(("broker", Arc::new(sink) as Arc<dyn Sink>, broker_assignment));
        }

        let mut registrations = self.registrations.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((name, _, _)) = sinks
            .iter()
            .find(|(name, _, _)| registrations.iter().any(|r| r.name == *name))
        {
            return Err(DispatcherError::DuplicateSink(name.to_string()));
        }

        let mut list = Vec::with_capacity(sinks.len() + registrations.len());
        for (name, sink, assignment) in sinks {
            list.push(Arc::new(self.registration(name, sink, config.level, assignment)));
        }
        list.extend(registrations.iter().cloned());
        *registrations = Arc::new(list);

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = DispatcherState::Initialized;
        Ok(())
    }

    fn registration(
        &self,
        name: &str,
        sink: Arc<dyn Sink>,
        floor: Level,
        assignment: FormatterAssignment,
    ) -> SinkRegistration {
        SinkRegistration {
            name: name.to_string(),
            sink,
            floor,
            formatter: Formatter::new(
                assignment,
                self.config.environment.clone(),
                self.config.envelope.clone(),
            ),
            live: AtomicBool::new(true),
        }
    }

    /// Add a sink next to the configured ones.
    ///
    /// Allowed on an uninitialized or initialized dispatcher. Names must
    /// be unique.
    pub fn register(
        &self,
        name: impl Into<String>,
        sink: Arc<dyn Sink>,
        floor: Level,
        assignment: FormatterAssignment,
    ) -> Result<(), DispatcherError> {
        if self.state() == DispatcherState::ShutDown || self.closing.load(Ordering::Acquire) {
            return Err(DispatcherError::ShutDown);
        }

        let name = name.into();
        let mut registrations = self.registrations.write().unwrap_or_else(PoisonError::into_inner);
        if registrations.iter().any(|r| r.name == name) {
            return Err(DispatcherError::DuplicateSink(name));
        }

        let mut list: Vec<_> = registrations.iter().cloned().collect();
        list.push(Arc::new(self.registration(&name, sink, floor, assignment)));
        *registrations = Arc::new(list);
        Ok(())
    }

    /// Remove and close the sink registered as `name`.
    ///
    /// Returns `false` when no such sink exists.
    pub fn deregister(&self, name: &str) -> bool {
        let removed = {
            let mut registrations = self.registrations.write().unwrap_or_else(PoisonError::into_inner);
            let Some(index) = registrations.iter().position(|r| r.name == name) else {
                return false;
            };
            let mut list: Vec<_> = registrations.iter().cloned().collect();
            let removed = list.remove(index);
            *registrations = Arc::new(list);
            removed
        };

        close_registration(&removed);
        true
    }

    /// Names of the live sinks, in delivery order.
    pub fn sink_names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .filter(|r| r.is_live())
            .map(|r| r.name.clone())
            .collect()
    }

    /// Current registrations, in delivery order.
    pub fn registrations(&self) -> Vec<Arc<SinkRegistration>> {
        self.snapshot().iter().cloned().collect()
    }

    /// Deliver `event` to every live sink whose floor it meets.
    pub fn emit(&self, event: &EventRecord) {
        if self.state() != DispatcherState::Initialized {
            return;
        }

        for registration in self.snapshot().iter() {
            if !registration.is_live() || event.level < registration.floor {
                continue;
            }
            if !registration.sink.accepts(event) {
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let payload = registration.formatter.format(event);
                registration.sink.emit(event, &payload)
            }));

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => report("error", &registration.name, &e.to_string()),
                Err(panic) => report("error", &registration.name, &panic_message(panic.as_ref())),
            }
        }
    }

    /// Close every sink, last registered first, so the broker goes before
    /// the file and the file before the console. Idempotent.
    pub fn shutdown(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        for registration in self.snapshot().iter().rev() {
            close_registration(registration);
        }

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = DispatcherState::ShutDown;
    }

    fn snapshot(&self) -> Arc<Vec<Arc<SinkRegistration>>> {
        Arc::clone(&self.registrations.read().unwrap_or_else(PoisonError::into_inner))
    }
}

fn close_registration(registration: &SinkRegistration) {
    if !registration.live.swap(false, Ordering::AcqRel) {
        return;
    }
    match panic::catch_unwind(AssertUnwindSafe(|| registration.sink.close())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => report("warning", &registration.name, &format!("close failed: {}", e)),
        Err(panic) => report(
            "warning",
            &registration.name,
            &format!("close panicked: {}", panic_message(panic.as_ref())),
        ),
    }
}

/// The dispatcher's own error channel. Goes straight to stderr so it can
/// never be routed back into a sink.
fn report(severity: &str, sink: &str, message: &str) {
    eprintln!("tracing-log-relay {}: sink '{}': {}", severity, sink, message);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(feature = "amqp")]
fn default_connector() -> Result<Arc<dyn BrokerConnector>, DispatcherError> {
    crate::amqp::AmqpConnector::new()
        .map(|c| Arc::new(c) as Arc<dyn BrokerConnector>)
        .map_err(|e| DispatcherError::BrokerUnavailable(e.to_string()))
}

#[cfg(not(feature = "amqp"))]
fn default_connector() -> Result<Arc<dyn BrokerConnector>, DispatcherError> {
    Err(DispatcherError::BrokerUnavailable(
        "amqp feature is not enabled".to_string(),
    ))
}

static GLOBAL: OnceLock<Mutex<Option<Arc<Dispatcher>>>> = OnceLock::new();

fn global() -> &'static Mutex<Option<Arc<Dispatcher>>> {
    GLOBAL.get_or_init(|| Mutex::new(None))
}

/// Replace the process-wide dispatcher, returning the previous one.
///
/// The previous dispatcher is not shut down.
pub fn set_dispatcher(dispatcher: Arc<Dispatcher>) -> Option<Arc<Dispatcher>> {
    global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(dispatcher)
}

/// The process-wide dispatcher if one was set or built, without creating
/// one.
pub fn current_dispatcher() -> Option<Arc<Dispatcher>> {
    global().lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// The process-wide dispatcher.
///
/// Built from the environment on first use when none was set. If the
/// environment is invalid, a console-only dispatcher with default settings
/// is used instead.
pub fn dispatcher() -> Arc<Dispatcher> {
    if let Some(current) = global().lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Arc::clone(current);
    }

    // Built without holding the lock; a racing caller's instance wins.
    let built = default_dispatcher();
    let mut slot = global().lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(slot.get_or_insert(built))
}

fn default_dispatcher() -> Arc<Dispatcher> {
    let config = LogConfig::from_env().unwrap_or_else(|e| {
        eprintln!("tracing-log-relay warning: invalid logging environment: {}", e);
        LogConfig::default()
    });

    let dispatcher = Dispatcher::new(config.clone());
    if let Err(e) = dispatcher.initialize() {
        eprintln!("tracing-log-relay warning: falling back to console logging: {}", e);
        let fallback = Dispatcher::new(LogConfig {
            to_broker: false,
            ..config
        });
        // Console-only setup has nothing left that can fail.
        let _ = fallback.initialize();
        return Arc::new(fallback);
    }
    Arc::new(dispatcher)
}

/// Emit through the process-wide dispatcher.
pub fn emit(event: &EventRecord) {
    dispatcher().emit(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop_sink::NoopSink;
    use crate::sink::SinkError;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        seen: Mutex<Vec<Level>>,
        closes: AtomicUsize,
    }

    impl Sink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        fn emit(&self, event: &EventRecord, _payload: &str) -> Result<(), SinkError> {
            self.seen.lock().unwrap().push(event.level);
            Ok(())
        }

        fn close(&self) -> Result<(), SinkError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink {
        panic: bool,
    }

    impl Sink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn emit(&self, _event: &EventRecord, _payload: &str) -> Result<(), SinkError> {
            if self.panic {
                panic!("sink exploded");
            }
            Err(SinkError::Io(std::io::Error::other("disk full")))
        }

        fn close(&self) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::other("close failed")))
        }
    }

    fn quiet_dispatcher() -> Dispatcher {
        let dispatcher = Dispatcher::builder(LogConfig {
            level: Level::Debug,
            ..LogConfig::default()
        })
        .console_writers(Box::new(std::io::sink()), Box::new(std::io::sink()))
        .build()
        .unwrap();
        assert!(dispatcher.deregister("console"));
        dispatcher
    }

    #[test]
    fn test_delivery_respects_floor() {
        let dispatcher = quiet_dispatcher();
        for floor in Level::ALL {
            let sink = Arc::new(CountingSink::default());
            let name = format!("floor-{}", floor);
            dispatcher
                .register(&name, Arc::clone(&sink) as Arc<dyn Sink>, floor, FormatterAssignment::plain())
                .unwrap();

            for level in Level::ALL {
                dispatcher.emit(&EventRecord::new(level, "m"));
            }

            let seen = sink.seen.lock().unwrap().clone();
            let expected: Vec<_> = Level::ALL.into_iter().filter(|l| *l >= floor).collect();
            assert_eq!(seen, expected);
            assert!(dispatcher.deregister(&name));
        }
    }

    #[test]
    fn test_failing_sinks_do_not_block_others() {
        let dispatcher = quiet_dispatcher();
        let good = Arc::new(CountingSink::default());
        dispatcher
            .register("err", Arc::new(FailingSink { panic: false }), Level::Debug, FormatterAssignment::plain())
            .unwrap();
        dispatcher
            .register("panic", Arc::new(FailingSink { panic: true }), Level::Debug, FormatterAssignment::plain())
            .unwrap();
        dispatcher
            .register("good", Arc::clone(&good) as Arc<dyn Sink>, Level::Debug, FormatterAssignment::plain())
            .unwrap();

        dispatcher.emit(&EventRecord::new(Level::Error, "m"));
        dispatcher.emit(&EventRecord::new(Level::Info, "m"));
        assert_eq!(good.seen.lock().unwrap().len(), 2);

        dispatcher.shutdown();
        assert_eq!(dispatcher.state(), DispatcherState::ShutDown);
    }

    #[test]
    fn test_uninitialized_dispatcher_drops_events() {
        let dispatcher = Dispatcher::new(LogConfig::default());
        let sink = Arc::new(CountingSink::default());
        dispatcher
            .register("c", Arc::clone(&sink) as Arc<dyn Sink>, Level::Debug, FormatterAssignment::plain())
            .unwrap();
        dispatcher.emit(&EventRecord::new(Level::Critical, "m"));
        assert!(sink.seen.lock().unwrap().is_empty());
        assert_eq!(dispatcher.state(), DispatcherState::Uninitialized);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_terminal() {
        let dispatcher = quiet_dispatcher();
        let sink = Arc::new(CountingSink::default());
        dispatcher
            .register("c", Arc::clone(&sink) as Arc<dyn Sink>, Level::Debug, FormatterAssignment::plain())
            .unwrap();

        dispatcher.shutdown();
        dispatcher.shutdown();
        assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.state(), DispatcherState::ShutDown);
        assert!(dispatcher.sink_names().is_empty());

        dispatcher.emit(&EventRecord::new(Level::Critical, "m"));
        assert!(sink.seen.lock().unwrap().is_empty());
        assert!(matches!(dispatcher.initialize(), Err(DispatcherError::ShutDown)));
        assert!(matches!(
            dispatcher.register("late", Arc::new(NoopSink), Level::Debug, FormatterAssignment::plain()),
            Err(DispatcherError::ShutDown)
        ));
    }

    #[test]
    fn test_sinks_registered_before_initialize_are_kept() {
        let dispatcher = Dispatcher::new(LogConfig::default());
        let sink = Arc::new(CountingSink::default());
        dispatcher
            .register("custom", Arc::clone(&sink) as Arc<dyn Sink>, Level::Debug, FormatterAssignment::plain())
            .unwrap();

        dispatcher.initialize().unwrap();
        assert_eq!(dispatcher.sink_names(), vec!["console".to_string(), "custom".to_string()]);

        dispatcher.emit(&EventRecord::new(Level::Warning, "m"));
        assert_eq!(*sink.seen.lock().unwrap(), vec![Level::Warning]);
    }

    #[test]
    fn test_initialize_rejects_name_taken_by_registered_sink() {
        let dispatcher = Dispatcher::new(LogConfig::default());
        dispatcher
            .register("console", Arc::new(NoopSink), Level::Debug, FormatterAssignment::plain())
            .unwrap();

        assert!(matches!(dispatcher.initialize(), Err(DispatcherError::DuplicateSink(ref n)) if n == "console"));
        assert_eq!(dispatcher.state(), DispatcherState::Uninitialized);
        assert_eq!(dispatcher.sink_names(), vec!["console".to_string()]);
    }

    #[test]
    fn test_concurrent_initialize_opens_sinks_once() {
        let dispatcher = Arc::new(Dispatcher::new(LogConfig {
            print: true,
            ..LogConfig::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&dispatcher);
                std::thread::spawn(move || d.initialize())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, DispatcherError::AlreadyInitialized)));
        assert_eq!(dispatcher.sink_names(), vec!["print".to_string()]);
    }

    #[test]
    fn test_double_initialize_is_rejected() {
        let dispatcher = quiet_dispatcher();
        assert!(matches!(dispatcher.initialize(), Err(DispatcherError::AlreadyInitialized)));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let dispatcher = quiet_dispatcher();
        dispatcher
            .register("n", Arc::new(NoopSink), Level::Debug, FormatterAssignment::plain())
            .unwrap();
        assert!(matches!(
            dispatcher.register("n", Arc::new(NoopSink), Level::Debug, FormatterAssignment::plain()),
            Err(DispatcherError::DuplicateSink(_))
        ));
        assert!(!dispatcher.deregister("missing"));
    }

    #[test]
    fn test_print_replaces_console() {
        let dispatcher = Dispatcher::builder(LogConfig {
            print: true,
            ..LogConfig::default()
        })
        .console_writers(Box::new(std::io::sink()), Box::new(std::io::sink()))
        .build()
        .unwrap();
        assert_eq!(dispatcher.sink_names(), vec!["print".to_string()]);
    }

    #[test]
    fn test_file_and_broker_never_get_color() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::builder(LogConfig {
            to_file: true,
            to_broker: true,
            json: true,
            color: true,
            pretty: true,
            log_dir: dir.path().to_path_buf(),
            ..LogConfig::default()
        })
        .console_writers(Box::new(std::io::sink()), Box::new(std::io::sink()))
        .connector(Arc::new(crate::publisher::testing::ScriptedConnector(Default::default())))
        .build()
        .unwrap();

        let registrations = dispatcher.registrations();
        let names: Vec<_> = registrations.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["console", "file", "broker"]);

        let console = registrations[0].assignment();
        assert_eq!(console.kind, FormatterKind::Json);
        assert!(console.color && console.pretty);
        assert_eq!(*registrations[1].assignment(), FormatterAssignment::plain());
        let broker = registrations[2].assignment();
        assert_eq!(broker.kind, FormatterKind::Json);
        assert!(!broker.color && !broker.pretty);
        assert!(registrations.iter().all(|r| r.floor() == Level::Info && r.is_live()));
    }

    #[test]
    fn test_concurrent_emitters() {
        let dispatcher = Arc::new(quiet_dispatcher());
        let sink = Arc::new(CountingSink::default());
        dispatcher
            .register("c", Arc::clone(&sink) as Arc<dyn Sink>, Level::Debug, FormatterAssignment::plain())
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let d = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        d.emit(&EventRecord::new(Level::Info, "m"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.seen.lock().unwrap().len(), 400);
    }

    #[test]
    fn test_global_accessor_substitution() {
        let custom = Arc::new(quiet_dispatcher());
        set_dispatcher(Arc::clone(&custom));
        assert!(Arc::ptr_eq(&dispatcher(), &custom));
        assert!(Arc::ptr_eq(&current_dispatcher().unwrap(), &custom));
    }
}
