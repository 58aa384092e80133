//! C ABI for hosts that embed the Shield activation engine.
//!
//! The host calls [`shield_init`] from its own startup sequence and keeps the
//! returned handle for the life of the process. Every entry point fails
//! closed: a null or unusable argument, a store error, or an uninitialized
//! handle all answer "not allowed" (`0` or null).
//!
//! Strings returned by this library must be released with
//! [`shield_free_string`].

use libc::c_int;
use serde::Serialize;
use shield_license::{
    ActivationEngine, DeviceInfo, EncryptedFileStore, HeartbeatClient, LicenseInfo,
    ShieldConfig,
};
use std::ffi::{c_char, CStr, CString};
use std::path::Path;
use std::sync::{Arc, Once};
use tracing::{error, info, warn};

static INIT_LOGGING: Once = Once::new();

/// Opaque engine handle owned by the host.
pub struct ShieldHandle {
    engine: ActivationEngine,
}

/// JSON envelope for string-returning calls.
#[derive(Serialize)]
struct SdkResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> SdkResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            error_code: None,
            error_message: None,
            data: Some(data),
        }
    }

    fn err(code: &'static str, message: &str) -> Self {
        Self {
            success: false,
            error_code: Some(code),
            error_message: Some(message.to_string()),
            data: None,
        }
    }
}

#[derive(Serialize)]
struct InfoPayload {
    #[serde(flatten)]
    license: LicenseInfo,
    device: DeviceInfo,
}

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        // A host that installed its own subscriber keeps it.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init();
    });
}

/// Reads an optional C string. `Err` means non-null but not UTF-8.
unsafe fn opt_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, ()> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map(Some).map_err(|_| ())
}

fn heartbeat_for(config: &ShieldConfig) -> Option<Arc<dyn HeartbeatClient>> {
    if !config.heartbeat_enabled {
        return None;
    }
    #[cfg(feature = "online")]
    {
        match shield_license::HttpHeartbeat::from_config(config) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "heartbeat client unavailable");
                None
            }
        }
    }
    #[cfg(not(feature = "online"))]
    {
        warn!("heartbeat enabled but built without the online feature");
        None
    }
}

fn build_engine(
    config_toml: Option<&str>,
    store_dir: &str,
    secret: &str,
) -> Result<ActivationEngine, String> {
    let config = match config_toml {
        Some(text) if !text.trim().is_empty() => {
            ShieldConfig::from_toml_str(text).map_err(|e| e.to_string())?
        }
        _ => ShieldConfig::builtin(),
    };
    let store = EncryptedFileStore::open(Path::new(store_dir), secret).map_err(|e| e.to_string())?;
    let mut builder = ActivationEngine::builder(config.clone(), Arc::new(store));
    if let Some(heartbeat) = heartbeat_for(&config) {
        builder = builder.heartbeat(heartbeat);
    }
    builder.build().map_err(|e| e.to_string())
}

/// Creates an engine over the encrypted store in `store_dir`.
///
/// `config_toml` may be null (or empty) for the compiled-in configuration.
/// Returns null on any failure.
///
/// # Safety
/// Non-null arguments must be valid null-terminated UTF-8 strings.
/// The handle must be released with [`shield_shutdown`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn shield_init(
    config_toml: *const c_char,
    store_dir: *const c_char,
    secret: *const c_char,
) -> *mut ShieldHandle {
    init_logging();

    let args = unsafe { (opt_str(config_toml), opt_str(store_dir), opt_str(secret)) };
    let (config_toml, store_dir, secret) = match args {
        (Ok(config), Ok(Some(dir)), Ok(Some(secret))) => (config, dir, secret),
        _ => {
            error!("shield_init: missing or invalid argument");
            return std::ptr::null_mut();
        }
    };

    match build_engine(config_toml, store_dir, secret) {
        Ok(engine) => {
            info!(app_id = %engine.config().app_id, "shield engine initialized");
            Box::into_raw(Box::new(ShieldHandle { engine }))
        }
        Err(e) => {
            error!(error = %e, "shield_init failed");
            std::ptr::null_mut()
        }
    }
}

/// Evaluates the license now. Returns 1 when the host may run, else 0.
///
/// # Safety
/// `handle` must be null or a live pointer from [`shield_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn shield_check_license(handle: *const ShieldHandle) -> c_int {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return 0;
    };
    match handle.engine.check() {
        Ok(decision) => c_int::from(decision.allowed),
        Err(e) => {
            error!(error = %e, "license check failed");
            0
        }
    }
}

/// Presents a license key. Returns 1 when the key was accepted and the host
/// may run, else 0.
///
/// # Safety
/// `handle` must be null or a live pointer from [`shield_init`]; `key` must
/// be null or a valid null-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn shield_activate(handle: *const ShieldHandle, key: *const c_char) -> c_int {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return 0;
    };
    let Ok(Some(key)) = (unsafe { opt_str(key) }) else {
        return 0;
    };
    match handle.engine.activate(key) {
        Ok(decision) => {
            let accepted = decision.key.as_ref().is_some_and(|v| v.is_accepted());
            c_int::from(accepted && decision.allowed)
        }
        Err(e) => {
            error!(error = %e, "activation failed");
            0
        }
    }
}

/// Returns a JSON description of the activation state, or null for a null
/// handle.
///
/// # Safety
/// `handle` must be null or a live pointer from [`shield_init`].
/// The returned pointer must be freed with [`shield_free_string`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn shield_get_info(handle: *const ShieldHandle) -> *mut c_char {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return std::ptr::null_mut();
    };
    let json = match handle.engine.info() {
        Ok(license) => serde_json::to_string(&SdkResponse::ok(InfoPayload {
            license,
            device: DeviceInfo::collect(),
        })),
        Err(e) => serde_json::to_string(&SdkResponse::<()>::err(
            "storage_unavailable",
            &e.to_string(),
        )),
    }
    .unwrap_or_else(|_| {
        r#"{"success":false,"error_code":"json_error","error_message":"Failed to serialize response"}"#
            .to_string()
    });
    CString::new(json).unwrap_or_default().into_raw()
}

/// Frees a string returned by this library.
///
/// # Safety
/// `ptr` must be null or a pointer returned by this library, freed once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn shield_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Releases the engine.
///
/// # Safety
/// `handle` must be null or a pointer from [`shield_init`], released once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn shield_shutdown(handle: *mut ShieldHandle) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}
