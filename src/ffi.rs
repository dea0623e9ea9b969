//! C FFI bindings for agristat.
//!
//! Exposes the staged pipeline to the desktop shell through a C-compatible
//! interface.
//!
//! # Design
//!
//! - **Opaque handle**: `*mut SessionContext` owns the current pipeline
//!   stage; entry points called out of order return -2
//! - **`#[repr(C)]`**: all data transfer structs
//! - **Integer error codes**: 0 = success, negative = error
//! - **Thread-local error message**: `agristat_last_error()`
//! - **`catch_unwind`**: every entry point, so panics never cross the boundary
//! - **Strings in, JSON out**: method kinds, chart kinds and role bindings are
//!   passed as strings; results come back as JSON
//!
//! # Safety
//!
//! Null pointer arguments return error code -1. Strings returned by
//! `agristat_session_result_json` must be released with
//! `agristat_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic;
use std::ptr;
use std::slice;

use crate::chart::ChartKind;
use crate::dispatch::{MethodKind, Roles};
use crate::error::AgriError;
use crate::normality::check_normality_with;
use crate::result::AnalysisResult;
use crate::session::{
    AnalysisRun, ChartRequest, ChartsRendered, DataLoaded, Exported, GateOutcome, Halted, NormalityChecked, Session,
    StageError, Transition,
};

// ── Error handling ────────────────────────────────────────────────────

/// Error codes returned by FFI functions.
pub const AGRISTAT_OK: i32 = 0;
pub const AGRISTAT_ERR_NULL_PTR: i32 = -1;
pub const AGRISTAT_ERR_INVALID_INPUT: i32 = -2;
pub const AGRISTAT_ERR_PARSE_FAILED: i32 = -3;
pub const AGRISTAT_ERR_ANALYSIS_FAILED: i32 = -4;
pub const AGRISTAT_ERR_CHART_FAILED: i32 = -5;
pub const AGRISTAT_ERR_EXPORT_FAILED: i32 = -6;
pub const AGRISTAT_ERR_PANIC: i32 = -99;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = CString::new(msg).ok();
    });
}

/// Records `err` and returns its code.
fn fail(err: &AgriError) -> i32 {
    set_last_error(&err.to_string());
    error_code(err)
}

fn error_code(err: &AgriError) -> i32 {
    match err {
        AgriError::EmptyTable(_)
        | AgriError::DuplicateColumn(_)
        | AgriError::DimensionMismatch { .. }
        | AgriError::CsvParse { .. } => AGRISTAT_ERR_PARSE_FAILED,
        AgriError::InsufficientData { .. }
        | AgriError::MissingRole { .. }
        | AgriError::ColumnType { .. }
        | AgriError::Config(_) => AGRISTAT_ERR_INVALID_INPUT,
        AgriError::AnalysisFailed { .. } => AGRISTAT_ERR_ANALYSIS_FAILED,
        AgriError::ChartRender(_) => AGRISTAT_ERR_CHART_FAILED,
        AgriError::Export(_) | AgriError::Io(_) => AGRISTAT_ERR_EXPORT_FAILED,
    }
}

/// Borrows a C string as UTF-8, recording an error on failure.
///
/// # Safety
/// `p` must be null or a valid null-terminated string that outlives `'a`.
unsafe fn borrow_str<'a>(p: *const c_char, what: &str) -> Result<&'a str, i32> {
    if p.is_null() {
        set_last_error(&format!("null {what} pointer"));
        return Err(AGRISTAT_ERR_NULL_PTR);
    }
    unsafe { CStr::from_ptr(p) }.to_str().map_err(|e| {
        set_last_error(&format!("invalid UTF-8 in {what}: {e}"));
        AGRISTAT_ERR_INVALID_INPUT
    })
}

/// Returns the last error message, or null if no error.
/// The returned string is valid until the next FFI call on this thread.
///
/// # Safety
/// The caller must not free the returned pointer.
#[no_mangle]
pub extern "C" fn agristat_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| {
        let borrow = cell.borrow();
        match borrow.as_ref() {
            Some(cstr) => cstr.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Clears the last error message.
#[no_mangle]
pub extern "C" fn agristat_clear_error() {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

/// Frees a string returned by this library.
///
/// # Safety
/// `s` must come from an agristat function returning `*mut c_char`, or be null.
#[no_mangle]
pub unsafe extern "C" fn agristat_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = unsafe { CString::from_raw(s) };
    }
}

// ── Version & logging ─────────────────────────────────────────────────

/// Returns the version string of agristat.
///
/// # Safety
/// The returned string is a static string literal. Do not free it.
#[no_mangle]
pub extern "C" fn agristat_version() -> *const c_char {
    c"0.1.0".as_ptr()
}

/// Installs a stderr log subscriber.
///
/// `level`: 0=error, 1=warn, 2=info, 3=debug, 4=trace. Calling again after a
/// subscriber is installed is a no-op that still returns 0.
#[no_mangle]
pub extern "C" fn agristat_init_logging(level: i32) -> i32 {
    let level = match level {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        4 => tracing::Level::TRACE,
        other => {
            set_last_error(&format!("invalid log level {other}"));
            return AGRISTAT_ERR_INVALID_INPUT;
        }
    };
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(%level, "logging initialized");
    }
    AGRISTAT_OK
}

// ── Normality (stateless) ─────────────────────────────────────────────

/// C-compatible Shapiro-Wilk result.
#[repr(C)]
pub struct CNormalityResult {
    /// Number of non-NaN observations tested.
    pub n: u32,
    /// W statistic.
    pub w: f64,
    /// p-value.
    pub p_value: f64,
    /// 1 if p-value ≥ 0.05, else 0.
    pub normal: u32,
}

/// Runs Shapiro-Wilk on `n` values. NaN entries are skipped.
///
/// Returns 0 on success, -2 if fewer than 4 valid values remain.
///
/// # Safety
/// `data` must point to `n` f64s. `out` must be valid.
#[no_mangle]
pub unsafe extern "C" fn agristat_check_normality(
    data: *const f64,
    n: u32,
    out: *mut CNormalityResult,
) -> i32 {
    let result = panic::catch_unwind(|| {
        if data.is_null() || out.is_null() {
            set_last_error("null pointer");
            return AGRISTAT_ERR_NULL_PTR;
        }
        let values = unsafe { slice::from_raw_parts(data, n as usize) };
        match check_normality_with(values, crate::normality::DEFAULT_MIN_SAMPLE) {
            Ok(sw) => {
                let out_ref = unsafe { &mut *out };
                out_ref.n = sw.n as u32;
                out_ref.w = sw.w;
                out_ref.p_value = sw.p_value;
                out_ref.normal = u32::from(sw.p_value >= 0.05);
                AGRISTAT_OK
            }
            Err(e) => fail(&e),
        }
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error("panic in agristat_check_normality");
            AGRISTAT_ERR_PANIC
        }
    }
}

// ── Session Context (opaque handle) ───────────────────────────────────

/// Where a session stands. Each entry point moves it forward or leaves it
/// where it was.
enum Stage {
    Loaded(DataLoaded),
    Checked(NormalityChecked),
    Halted(Halted),
    Analyzed(ChartsRendered),
    /// The exported result, kept for `agristat_session_result_json`.
    Exported(AnalysisResult),
}

impl Stage {
    /// Completes "cannot <action> ..." for an entry point called out of order.
    fn blocker(stage: Option<&Stage>) -> &'static str {
        match stage {
            Some(Stage::Loaded(_)) => "before the normality gate",
            Some(Stage::Checked(_)) => "before a method has run",
            Some(Stage::Halted(_)) => "after the normality gate halted the pipeline",
            Some(Stage::Analyzed(_)) => "after a method has run",
            Some(Stage::Exported(_)) => "after the report was exported",
            None => "on a session left unusable by an internal panic",
        }
    }
}

/// Opaque handle for a pipeline session.
///
/// Holds exactly one stage. The gate runs once; a passed gate allows any
/// number of method runs, each replacing the previous result and dropping
/// its charts; exporting ends the session.
pub struct SessionContext {
    rows: usize,
    columns: usize,
    stage: Option<Stage>,
}

fn out_of_order(action: &str, stage: Option<&Stage>) -> i32 {
    set_last_error(&format!("cannot {action} {}", Stage::blocker(stage)));
    AGRISTAT_ERR_INVALID_INPUT
}

/// Stores the next stage, or puts the previous one back and records the error.
fn advance<T, S>(
    slot: &mut Option<Stage>,
    transition: Transition<T, S>,
    next: impl FnOnce(T) -> Stage,
    back: impl FnOnce(S) -> Stage,
) -> i32 {
    match transition {
        Ok(value) => {
            *slot = Some(next(value));
            AGRISTAT_OK
        }
        Err(StageError { error, stage }) => {
            *slot = Some(back(stage));
            fail(&error)
        }
    }
}

/// Creates a session from CSV text with the default configuration.
///
/// # Safety
/// - `csv_data` must be a valid null-terminated UTF-8 string.
/// - The returned handle must be freed with `agristat_session_free`.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_from_csv(csv_data: *const c_char) -> *mut SessionContext {
    let result = panic::catch_unwind(|| {
        let csv = match unsafe { borrow_str(csv_data, "csv_data") } {
            Ok(s) => s,
            Err(_) => return ptr::null_mut(),
        };
        let loaded = match Session::default().load_csv_str(csv) {
            Ok(l) => l,
            Err(e) => {
                set_last_error(&format!("CSV parse error: {e}"));
                return ptr::null_mut();
            }
        };
        Box::into_raw(Box::new(SessionContext {
            rows: loaded.table().row_count(),
            columns: loaded.table().column_count(),
            stage: Some(Stage::Loaded(loaded)),
        }))
    });

    match result {
        Ok(ptr) => ptr,
        Err(_) => {
            set_last_error("panic in agristat_session_from_csv");
            ptr::null_mut()
        }
    }
}

/// Frees a session context.
///
/// # Safety
/// `ctx` must be a valid pointer from `agristat_session_from_csv`, or null.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_free(ctx: *mut SessionContext) {
    if !ctx.is_null() {
        let _ = unsafe { Box::from_raw(ctx) };
    }
}

/// Returns the number of data rows in the session.
///
/// # Safety
/// `ctx` must be a valid, non-null session context.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_row_count(ctx: *const SessionContext) -> i64 {
    if ctx.is_null() {
        set_last_error("null context");
        return -1;
    }
    let ctx = unsafe { &*ctx };
    ctx.rows as i64
}

/// Returns the number of columns in the session.
///
/// # Safety
/// `ctx` must be a valid, non-null session context.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_col_count(ctx: *const SessionContext) -> i64 {
    if ctx.is_null() {
        set_last_error("null context");
        return -1;
    }
    let ctx = unsafe { &*ctx };
    ctx.columns as i64
}

/// Runs the normality gate on every numeric column.
///
/// On success `*out_halted` is 1 if the pipeline halted (see
/// `agristat_session_result_json` for the report), else 0. The gate runs
/// once per session; a second call returns -2.
///
/// # Safety
/// `ctx` and `out_halted` must be valid.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_gate(ctx: *mut SessionContext, out_halted: *mut i32) -> i32 {
    let result = panic::catch_unwind(|| {
        if ctx.is_null() || out_halted.is_null() {
            set_last_error("null pointer");
            return AGRISTAT_ERR_NULL_PTR;
        }
        let ctx = unsafe { &mut *ctx };
        let loaded = match ctx.stage.take() {
            Some(Stage::Loaded(loaded)) => loaded,
            other => {
                ctx.stage = other;
                return out_of_order("run the normality gate", ctx.stage.as_ref());
            }
        };
        advance(
            &mut ctx.stage,
            loaded.check_normality(&[]),
            |outcome| {
                unsafe { *out_halted = i32::from(outcome.is_halted()) };
                match outcome {
                    GateOutcome::Proceed(checked) => Stage::Checked(checked),
                    GateOutcome::Halted(halted) => Stage::Halted(halted),
                }
            },
            Stage::Loaded,
        )
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error("panic in agristat_session_gate");
            AGRISTAT_ERR_PANIC
        }
    }
}

/// Runs a method (`"one-way-anova"`, `"correlation"`, ...) with JSON role
/// bindings such as `{"factor":"Variety","value":"Yield"}`.
///
/// Requires a passed normality gate. Replaces any previous result and drops
/// its charts; on failure the previous result stays.
///
/// # Safety
/// `ctx` must be valid; `kind` and `roles_json` must be null-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_run(
    ctx: *mut SessionContext,
    kind: *const c_char,
    roles_json: *const c_char,
) -> i32 {
    let result = panic::catch_unwind(|| {
        if ctx.is_null() {
            set_last_error("null context");
            return AGRISTAT_ERR_NULL_PTR;
        }
        let (kind, roles) = match unsafe { (borrow_str(kind, "kind"), borrow_str(roles_json, "roles_json")) } {
            (Ok(k), Ok(r)) => (k, r),
            (Err(code), _) | (_, Err(code)) => return code,
        };
        let ctx = unsafe { &mut *ctx };
        if !matches!(ctx.stage, Some(Stage::Checked(_) | Stage::Analyzed(_))) {
            return out_of_order("run a method", ctx.stage.as_ref());
        }
        let parsed = kind
            .parse::<MethodKind>()
            .and_then(|kind| Ok((kind, Roles::from_json(roles)?)));
        let (kind, roles) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return fail(&e),
        };
        let analyzed = |run: AnalysisRun| Stage::Analyzed(ChartsRendered::from(run));
        match ctx.stage.take() {
            Some(Stage::Checked(checked)) => {
                advance(&mut ctx.stage, checked.run(kind, &roles), analyzed, Stage::Checked)
            }
            Some(Stage::Analyzed(previous)) => {
                advance(&mut ctx.stage, previous.rerun(kind, &roles), analyzed, Stage::Analyzed)
            }
            other => {
                ctx.stage = other;
                out_of_order("run a method", ctx.stage.as_ref())
            }
        }
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error("panic in agristat_session_run");
            AGRISTAT_ERR_PANIC
        }
    }
}

/// Returns the current result as JSON: the analysis if one has run, else
/// the normality report of a halted gate. Null if neither exists.
///
/// # Safety
/// `ctx` must be valid. Free the result with `agristat_free_string`.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_result_json(ctx: *const SessionContext) -> *mut c_char {
    let result = panic::catch_unwind(|| {
        if ctx.is_null() {
            set_last_error("null context");
            return ptr::null_mut();
        }
        let ctx = unsafe { &*ctx };
        let json = match &ctx.stage {
            Some(Stage::Analyzed(stage)) => stage.result().to_json(),
            Some(Stage::Exported(result)) => result.to_json(),
            Some(Stage::Halted(h)) => AnalysisResult::Normality(h.report().clone()).to_json(),
            _ => {
                set_last_error("no result available");
                return ptr::null_mut();
            }
        };
        match json.map(CString::new) {
            Ok(Ok(s)) => s.into_raw(),
            Ok(Err(e)) => {
                set_last_error(&format!("result contains NUL byte: {e}"));
                ptr::null_mut()
            }
            Err(e) => {
                fail(&e);
                ptr::null_mut()
            }
        }
    });

    match result {
        Ok(ptr) => ptr,
        Err(_) => {
            set_last_error("panic in agristat_session_result_json");
            ptr::null_mut()
        }
    }
}

/// Renders a chart (`"bar"`, `"box"`, `"pie"`) for the current analysis and
/// writes it to `path` (`.png` or `.svg`).
///
/// # Safety
/// `ctx` must be valid; string arguments must be null-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_render_chart(
    ctx: *mut SessionContext,
    kind: *const c_char,
    roles_json: *const c_char,
    path: *const c_char,
) -> i32 {
    let result = panic::catch_unwind(|| {
        if ctx.is_null() {
            set_last_error("null context");
            return AGRISTAT_ERR_NULL_PTR;
        }
        let args = unsafe {
            (
                borrow_str(kind, "kind"),
                borrow_str(roles_json, "roles_json"),
                borrow_str(path, "path"),
            )
        };
        let (kind, roles, path) = match args {
            (Ok(k), Ok(r), Ok(p)) => (k, r, p),
            (Err(code), _, _) | (_, Err(code), _) | (_, _, Err(code)) => return code,
        };
        let ctx = unsafe { &mut *ctx };
        if !matches!(ctx.stage, Some(Stage::Analyzed(_))) {
            return out_of_order("render a chart", ctx.stage.as_ref());
        }
        let request = kind
            .parse::<ChartKind>()
            .and_then(|kind| Ok(ChartRequest::new(kind, Roles::from_json(roles)?, path)));
        let request = match request {
            Ok(request) => request,
            Err(e) => return fail(&e),
        };
        match ctx.stage.take() {
            Some(Stage::Analyzed(stage)) => advance(
                &mut ctx.stage,
                stage.with_chart(&request),
                Stage::Analyzed,
                Stage::Analyzed,
            ),
            other => {
                ctx.stage = other;
                out_of_order("render a chart", ctx.stage.as_ref())
            }
        }
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error("panic in agristat_session_render_chart");
            AGRISTAT_ERR_PANIC
        }
    }
}

/// Exports the `.docx` report for the current analysis and its charts.
///
/// A successful export ends the session: the result stays readable through
/// `agristat_session_result_json`, every other call returns -2. A failed
/// export leaves the analysis and charts in place.
///
/// # Safety
/// `ctx` must be valid; `path` and `title` must be null-terminated UTF-8.
#[no_mangle]
pub unsafe extern "C" fn agristat_session_export(
    ctx: *mut SessionContext,
    path: *const c_char,
    title: *const c_char,
) -> i32 {
    let result = panic::catch_unwind(|| {
        if ctx.is_null() {
            set_last_error("null context");
            return AGRISTAT_ERR_NULL_PTR;
        }
        let (path, title) = match unsafe { (borrow_str(path, "path"), borrow_str(title, "title")) } {
            (Ok(p), Ok(t)) => (p, t),
            (Err(code), _) | (_, Err(code)) => return code,
        };
        let ctx = unsafe { &mut *ctx };
        let stage = match ctx.stage.take() {
            Some(Stage::Analyzed(stage)) => stage,
            other => {
                ctx.stage = other;
                return out_of_order("export a report", ctx.stage.as_ref());
            }
        };
        let result = stage.result().clone();
        advance(
            &mut ctx.stage,
            stage.export(path, title),
            |exported: Exported| {
                tracing::debug!(path = %exported.path.display(), charts = exported.chart_count, "session exported");
                Stage::Exported(result)
            },
            Stage::Analyzed,
        )
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error("panic in agristat_session_export");
            AGRISTAT_ERR_PANIC
        }
    }
}
