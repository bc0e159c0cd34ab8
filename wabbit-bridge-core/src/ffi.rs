//! C ABI for foreign hosts
//!
//! Every entry point returns a status code: `0` on success, otherwise the
//! code of the [`ErrorKind`](crate::error::ErrorKind) it failed with. The failure itself is kept in a
//! thread-local record read back with [`wabbit_last_error_kind`] and
//! [`wabbit_last_error_message`]. Output parameters are written only on
//! success, except the handle of [`wabbit_initialize`] which is zeroed first.
//!
//! Text buffers use a size in/out protocol: `*len` holds the capacity on
//! entry and the required size (including the trailing NUL) on return. A
//! buffer that is too small yields `ResourceExhausted` and nothing is written.

use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::ffi::{CStr, c_char};
use std::panic;
use std::ptr;
use tracing::{error, info};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::{self, BridgeResult, ErrorEnvelope, ErrorKind, STATUS_OK};
use crate::session::SessionHandle;

static BRIDGE: Lazy<BridgeResult<Bridge>> = Lazy::new(|| {
    let bridge = BridgeConfig::from_env()
        .map_err(|err| ErrorEnvelope::invalid_configuration(format!("{err:#}")))
        .and_then(|config| Bridge::from_config(&config));

    match &bridge {
        Ok(bridge) => info!(core = bridge.core_name(), "process bridge ready"),
        Err(err) => error!(kind = %err.kind, "process bridge unavailable: {}", err.message),
    }
    bridge
});

thread_local! {
    static LAST_ERROR: RefCell<Option<ErrorEnvelope>> = const { RefCell::new(None) };
}

fn bridge() -> BridgeResult<&'static Bridge> {
    Lazy::force(&BRIDGE).as_ref().map_err(Clone::clone)
}

fn status(result: BridgeResult<()>) -> i32 {
    match result {
        Ok(()) => {
            LAST_ERROR.with(|last| last.borrow_mut().take());
            STATUS_OK
        }
        Err(err) => {
            let code = err.code();
            LAST_ERROR.with(|last| *last.borrow_mut() = Some(err));
            code
        }
    }
}

/// Borrow a NUL-terminated UTF-8 string for the duration of a call
///
/// # Safety
/// `text` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn borrow_str<'a>(text: *const c_char, what: &str) -> Result<&'a str, String> {
    if text.is_null() {
        return Err(format!("{what} pointer is null"));
    }
    unsafe { CStr::from_ptr(text) }
        .to_str()
        .map_err(|e| format!("{what} is not valid UTF-8: {e}"))
}

/// Copy `text` into a caller buffer following the size in/out protocol
///
/// # Safety
/// `len` must be null or valid for reads and writes; `buffer` must be null or
/// valid for `*len` bytes of writes.
unsafe fn write_text(text: &str, buffer: *mut c_char, len: *mut usize) -> BridgeResult<()> {
    if len.is_null() {
        return Err(ErrorEnvelope::runtime("buffer length pointer is null"));
    }

    let needed = text.len() + 1;
    let capacity = unsafe { *len };
    unsafe { *len = needed };
    if buffer.is_null() || capacity < needed {
        return Err(ErrorEnvelope::resource_exhausted(format!(
            "buffer of {capacity} bytes is too small, {needed} required"
        )));
    }

    unsafe {
        ptr::copy_nonoverlapping(text.as_ptr(), buffer.cast::<u8>(), text.len());
        *buffer.add(text.len()) = 0;
    }
    Ok(())
}

/// Run one entry point body under the unwind guard and record its outcome
fn boundary(operation: &str, f: impl FnOnce() -> BridgeResult<()>) -> i32 {
    status(error::guard(operation, f))
}

/// Open a session; the new handle is written to `handle_out`
///
/// # Safety
/// `config` must be null or a NUL-terminated string; `handle_out` must be null
/// or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wabbit_initialize(config: *const c_char, handle_out: *mut u64) -> i32 {
    boundary("initialize", || {
        if handle_out.is_null() {
            return Err(ErrorEnvelope::runtime("handle output pointer is null"));
        }
        unsafe { *handle_out = SessionHandle::NONE };

        let config = unsafe { borrow_str(config, "configuration") }
            .map_err(ErrorEnvelope::invalid_configuration)?;
        let handle = bridge()?.initialize(config)?;
        unsafe { *handle_out = handle.as_raw() };
        Ok(())
    })
}

/// Learn from or predict on one example; the prediction is written to `prediction_out`
///
/// # Safety
/// `example` must be null or a NUL-terminated string; `prediction_out` must be
/// null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wabbit_predict_or_learn(
    example: *const c_char,
    learn: bool,
    handle: u64,
    prediction_out: *mut f32,
) -> i32 {
    boundary("predict_or_learn", || {
        if prediction_out.is_null() {
            return Err(ErrorEnvelope::runtime("prediction output pointer is null"));
        }

        let text = unsafe { borrow_str(example, "example") }.map_err(ErrorEnvelope::runtime)?;
        let prediction = bridge()?.predict_or_learn(SessionHandle::from_raw(handle), text, learn)?;
        unsafe { *prediction_out = prediction };
        Ok(())
    })
}

/// Close a session
#[unsafe(no_mangle)]
pub extern "C" fn wabbit_close(handle: u64) -> i32 {
    boundary("close", || bridge()?.close(SessionHandle::from_raw(handle)))
}

/// Code of the last failure on this thread, `0` if the last call succeeded
#[unsafe(no_mangle)]
pub extern "C" fn wabbit_last_error_kind() -> i32 {
    panic::catch_unwind(|| {
        LAST_ERROR.with(|last| last.borrow().as_ref().map_or(STATUS_OK, ErrorEnvelope::code))
    })
    .unwrap_or(ErrorKind::UnknownFailure.code())
}

/// Message of the last failure on this thread, empty if the last call succeeded
///
/// Reading the message does not replace the recorded failure.
///
/// # Safety
/// See the module documentation for the buffer protocol.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wabbit_last_error_message(buffer: *mut c_char, len: *mut usize) -> i32 {
    let result = error::guard("last_error_message", || {
        let message = LAST_ERROR.with(|last| {
            last.borrow().as_ref().map(|err| err.message.clone()).unwrap_or_default()
        });
        unsafe { write_text(&message, buffer, len) }
    });

    match result {
        Ok(()) => STATUS_OK,
        Err(err) => err.code(),
    }
}

/// Session information as JSON
///
/// # Safety
/// See the module documentation for the buffer protocol.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wabbit_session_info(handle: u64, buffer: *mut c_char, len: *mut usize) -> i32 {
    boundary("session_info", || {
        let info = bridge()?.registry().info(SessionHandle::from_raw(handle))?;
        let json = serde_json::to_string(&info)
            .map_err(|e| ErrorEnvelope::runtime(format!("failed to encode session info: {e}")))?;
        unsafe { write_text(&json, buffer, len) }
    })
}
