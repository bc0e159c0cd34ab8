// Native Learning Core
//
// Drives a learner compiled into a dynamic library. The library exports a
// small C interface; every entry point returns a status code and writes a
// message into a caller-provided buffer on failure.

use libloading::{Library, Symbol};
use std::ffi::{CString, c_char, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::LearningCore;
use crate::error::CoreFailure;
use crate::label::{LabelKind, RawPrediction};
use crate::session::{CoreFactory, ManagedSession, Session};

/// Status codes returned by native cores
pub const STATUS_OK: i32 = 0;
pub const STATUS_ALLOCATION: i32 = 1;
pub const STATUS_OPTIONS: i32 = 2;
pub const STATUS_RUNTIME: i32 = 3;

const MESSAGE_CAPACITY: usize = 1024;

/// Type aliases for core functions
type ConstructFn =
    unsafe extern "C" fn(*const c_char, *mut *mut c_void, *mut u8, *mut usize) -> i32;
type LabelKindFn = unsafe extern "C" fn(*mut c_void) -> u32;
type ReadExampleFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, *mut *mut c_void, *mut u8, *mut usize) -> i32;
type InferFn =
    unsafe extern "C" fn(*mut c_void, *mut c_void, *mut NativePrediction, *mut u8, *mut usize) -> i32;
type FinishExampleFn = unsafe extern "C" fn(*mut c_void, *mut c_void);
type FinishFn = unsafe extern "C" fn(*mut c_void, *mut u8, *mut usize) -> i32;
type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Prediction as written by a native core
///
/// Both fields are always present; the session's label kind decides which
/// one holds the result.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NativePrediction {
    pub scalar: f32,
    pub multiclass: u32,
}

impl NativePrediction {
    pub fn into_raw(self, kind: LabelKind) -> RawPrediction {
        match kind {
            LabelKind::Scalar => RawPrediction::Scalar(self.scalar),
            LabelKind::Multiclass => {
                RawPrediction::Multiclass { class: self.multiclass, scores: Vec::new() }
            }
        }
    }
}

/// Map a native status code and message onto a core failure
pub fn failure_from_status(status: i32, message: String) -> CoreFailure {
    match status {
        STATUS_ALLOCATION => CoreFailure::allocation(message),
        STATUS_OPTIONS => CoreFailure::options(message),
        STATUS_RUNTIME => CoreFailure::runtime(message),
        other => CoreFailure::unrecognized(format!("status {other}: {message}")),
    }
}

/// Buffer a native call writes its failure message into
struct MessageBuffer {
    bytes: Vec<u8>,
    len: usize,
}

impl MessageBuffer {
    fn new() -> Self {
        Self { bytes: vec![0u8; MESSAGE_CAPACITY], len: MESSAGE_CAPACITY }
    }

    fn check(mut self, status: i32) -> Result<(), CoreFailure> {
        if status == STATUS_OK {
            return Ok(());
        }
        self.bytes.truncate(self.len.min(MESSAGE_CAPACITY));
        let message = String::from_utf8_lossy(&self.bytes).trim_end_matches('\0').to_string();
        Err(failure_from_status(status, message))
    }
}

fn c_string(text: &str, what: &str) -> Result<CString, CoreFailure> {
    CString::new(text)
        .map_err(|_| CoreFailure::runtime(format!("{what} contains an interior NUL byte")))
}

/// Entry points exported by a core library
#[derive(Clone, Copy)]
struct CoreApi {
    construct: ConstructFn,
    label_kind: LabelKindFn,
    read_example: ReadExampleFn,
    learn: InferFn,
    predict: InferFn,
    finish_example: FinishExampleFn,
    finish: FinishFn,
    destroy: DestroyFn,
}

impl CoreApi {
    /// Construct a core instance; `library` keeps the entry points loaded
    fn construct(self, library: Option<Arc<Library>>, config: &str) -> Result<NativeCore, CoreFailure> {
        let config = c_string(config, "configuration")?;
        let mut state: *mut c_void = ptr::null_mut();
        let mut buffer = MessageBuffer::new();
        let status = unsafe {
            (self.construct)(config.as_ptr(), &mut state, buffer.bytes.as_mut_ptr(), &mut buffer.len)
        };
        buffer.check(status)?;

        let state = NonNull::new(state)
            .ok_or_else(|| CoreFailure::unrecognized("core_construct reported success without state"))?;

        let kind = match LabelKind::try_from(unsafe { (self.label_kind)(state.as_ptr()) }) {
            Ok(kind) => kind,
            Err(err) => {
                unsafe { (self.destroy)(state.as_ptr()) };
                return Err(err);
            }
        };

        debug!(label_kind = %kind, "constructed native core");
        Ok(NativeCore { _library: library, api: self, state, kind })
    }
}

/// Dynamic library exporting a learning core
#[derive(Clone)]
pub struct NativeLibrary {
    library: Arc<Library>,
}

impl NativeLibrary {
    /// Load a core library
    pub fn load(path: &Path) -> Result<Self, CoreFailure> {
        let library = unsafe { Library::new(path) }.map_err(|e| {
            CoreFailure::runtime(format!("failed to load core library {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), "loaded native core library");
        Ok(Self { library: Arc::new(library) })
    }

    fn symbol<T: Copy>(&self, name: &[u8]) -> Result<T, CoreFailure> {
        unsafe {
            let symbol: Symbol<T> = self.library.get(name).map_err(|e| {
                CoreFailure::runtime(format!(
                    "core library doesn't export '{}': {e}",
                    String::from_utf8_lossy(name)
                ))
            })?;
            Ok(*symbol)
        }
    }

    fn api(&self) -> Result<CoreApi, CoreFailure> {
        Ok(CoreApi {
            construct: self.symbol(b"core_construct")?,
            label_kind: self.symbol(b"core_label_kind")?,
            read_example: self.symbol(b"core_read_example")?,
            learn: self.symbol(b"core_learn")?,
            predict: self.symbol(b"core_predict")?,
            finish_example: self.symbol(b"core_finish_example")?,
            finish: self.symbol(b"core_finish")?,
            destroy: self.symbol(b"core_destroy")?,
        })
    }

    /// Construct a core instance from a configuration string
    pub fn construct(&self, config: &str) -> Result<NativeCore, CoreFailure> {
        self.api()?.construct(Some(Arc::clone(&self.library)), config)
    }
}

impl CoreFactory for NativeLibrary {
    fn name(&self) -> &'static str {
        "native"
    }

    fn construct(&self, config: &str) -> Result<Box<dyn ManagedSession>, CoreFailure> {
        Ok(Box::new(Session::new(NativeLibrary::construct(self, config)?)))
    }
}

/// Example owned by a native core
pub struct NativeExample(NonNull<c_void>);

// SAFETY: examples are only touched through the core that created them,
// which the session accesses exclusively.
unsafe impl Send for NativeExample {}

/// Core instance living in a dynamic library
pub struct NativeCore {
    // Keeps the entry points in `api` valid.
    _library: Option<Arc<Library>>,
    api: CoreApi,
    state: NonNull<c_void>,
    kind: LabelKind,
}

// SAFETY: the state pointer is only dereferenced by the library through
// `&mut self` methods; shared access only reads the cached label kind.
unsafe impl Send for NativeCore {}
unsafe impl Sync for NativeCore {}

impl NativeCore {
    fn infer(
        &mut self,
        function: InferFn,
        example: &mut NativeExample,
    ) -> Result<RawPrediction, CoreFailure> {
        let mut prediction = NativePrediction::default();
        let mut buffer = MessageBuffer::new();
        let status = unsafe {
            function(
                self.state.as_ptr(),
                example.0.as_ptr(),
                &mut prediction,
                buffer.bytes.as_mut_ptr(),
                &mut buffer.len,
            )
        };
        buffer.check(status)?;
        Ok(prediction.into_raw(self.kind))
    }
}

impl LearningCore for NativeCore {
    type Example = NativeExample;

    fn label_kind(&self) -> LabelKind {
        self.kind
    }

    fn read_example(&mut self, text: &str) -> Result<NativeExample, CoreFailure> {
        let text = c_string(text, "example text")?;
        let mut example: *mut c_void = ptr::null_mut();
        let mut buffer = MessageBuffer::new();
        let status = unsafe {
            (self.api.read_example)(
                self.state.as_ptr(),
                text.as_ptr(),
                &mut example,
                buffer.bytes.as_mut_ptr(),
                &mut buffer.len,
            )
        };
        buffer.check(status)?;

        NonNull::new(example)
            .map(NativeExample)
            .ok_or_else(|| CoreFailure::unrecognized("core_read_example reported success without an example"))
    }

    fn learn(&mut self, example: &mut NativeExample) -> Result<RawPrediction, CoreFailure> {
        self.infer(self.api.learn, example)
    }

    fn predict(&mut self, example: &mut NativeExample) -> Result<RawPrediction, CoreFailure> {
        self.infer(self.api.predict, example)
    }

    fn finish_example(&mut self, example: &mut NativeExample) {
        unsafe { (self.api.finish_example)(self.state.as_ptr(), example.0.as_ptr()) }
    }

    fn finish(&mut self) -> Result<(), CoreFailure> {
        let mut buffer = MessageBuffer::new();
        let status =
            unsafe { (self.api.finish)(self.state.as_ptr(), buffer.bytes.as_mut_ptr(), &mut buffer.len) };
        buffer.check(status)
    }
}

impl Drop for NativeCore {
    fn drop(&mut self) {
        unsafe { (self.api.destroy)(self.state.as_ptr()) }
    }
}
