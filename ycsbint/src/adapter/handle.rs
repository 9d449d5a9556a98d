use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use biometrics::{Collector, Counter};

use crate::engine::Engine;
use crate::Error;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static OPEN: Counter = Counter::new("ycsbint.handle.open");
static OPEN_FAILED: Counter = Counter::new("ycsbint.handle.open_failed");
static CLOSE: Counter = Counter::new("ycsbint.handle.close");
static CLOSE_FAILED: Counter = Counter::new("ycsbint.handle.close_failed");

pub(crate) fn register_biometrics(collector: &Collector) {
    collector.register_counter(&OPEN);
    collector.register_counter(&OPEN_FAILED);
    collector.register_counter(&CLOSE);
    collector.register_counter(&CLOSE_FAILED);
}

//////////////////////////////////////////// SharedHandle //////////////////////////////////////////

/// Opens an engine.  Called at most once per open/close cycle of a [SharedHandle].
pub type Opener<E> = Box<dyn Fn() -> Result<Arc<E>, Error> + Send + Sync>;

struct HandleState<E: ?Sized> {
    engine: Option<Arc<E>>,
    refs: u64,
    opens: u64,
    closes: u64,
}

/// A reference-counted engine shared by every adapter created for it.
///
/// The first [SharedHandle::acquire] opens the engine and the last [SharedHandle::release] closes
/// it.  Both happen under one mutex, so concurrent acquirers observe exactly one open.
pub struct SharedHandle<E: ?Sized + Engine> {
    name: String,
    opener: Opener<E>,
    state: Mutex<HandleState<E>>,
}

impl<E: ?Sized + Engine> SharedHandle<E> {
    pub fn new<F>(name: impl Into<String>, opener: F) -> Self
    where
        F: Fn() -> Result<Arc<E>, Error> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            opener: Box::new(opener),
            state: Mutex::new(HandleState {
                engine: None,
                refs: 0,
                opens: 0,
                closes: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take a reference to the engine, opening it if nobody holds one.  A failed open leaves the
    /// reference count unchanged.
    pub fn acquire(&self) -> Result<Arc<E>, Error> {
        let mut state = self.lock();
        if let Some(engine) = &state.engine {
            let engine = Arc::clone(engine);
            state.refs += 1;
            return Ok(engine);
        }
        let engine = match (self.opener)() {
            Ok(engine) => engine,
            Err(err) => {
                OPEN_FAILED.click();
                log::error!("could not open {}: {}", self.name, err);
                return Err(err);
            }
        };
        OPEN.click();
        log::info!("opened {}", self.name);
        state.engine = Some(Arc::clone(&engine));
        state.refs = 1;
        state.opens += 1;
        Ok(engine)
    }

    /// Drop one reference, closing the engine when it was the last.
    pub fn release(&self) -> Result<(), Error> {
        let mut state = self.lock();
        if state.refs == 0 {
            return Err(Error::configuration(format!(
                "{} released more times than it was acquired",
                self.name
            )));
        }
        state.refs -= 1;
        if state.refs > 0 {
            return Ok(());
        }
        if let Some(engine) = state.engine.take() {
            state.closes += 1;
            if let Err(err) = engine.close() {
                CLOSE_FAILED.click();
                log::error!("could not close {}: {}", self.name, err);
                return Err(err);
            }
            CLOSE.click();
            log::info!("closed {}", self.name);
        }
        Ok(())
    }

    /// The number of outstanding references.
    pub fn refs(&self) -> u64 {
        self.lock().refs
    }

    /// The number of times the engine has been opened.
    pub fn opens(&self) -> u64 {
        self.lock().opens
    }

    /// The number of times the engine has been closed.
    pub fn closes(&self) -> u64 {
        self.lock().closes
    }

    pub fn is_open(&self) -> bool {
        self.lock().engine.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HandleState<E>> {
        // The state is consistent at every point a panic could unwind through.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: ?Sized + Engine> Debug for SharedHandle<E> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        fmt.debug_struct("SharedHandle")
            .field("name", &self.name)
            .field("open", &state.engine.is_some())
            .field("refs", &state.refs)
            .field("opens", &state.opens)
            .field("closes", &state.closes)
            .finish()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
