//! Script host bindings.
//!
//! Installs the `env.ws_*` functions into a Boa context so scripts see the
//! same surface a WASM guest imports. Buffers are array-likes (`Array` or
//! `Uint8Array`) instead of pointers into linear memory; results use the same
//! sentinels as the host ABI, and no call throws into the script.

use std::cell::RefCell;
use std::rc::Rc;

use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsObject, JsResult, JsString, JsValue, NativeFunction, js_string};
use boa_gc::{Finalize, Trace, empty_trace};

use crate::ws::abi::{IMPORTS, INVALID_HANDLE, NAMESPACE, NO_FRAME, PLUGIN};
use crate::ws::state::{Handle, WS_NOT_EXISTING, WsState};
use crate::ws::table::ConnectionTable;

/// A connection table shared between the host and a script context.
#[derive(Clone, Finalize)]
pub struct SharedTable(Rc<RefCell<ConnectionTable>>);

// Holds no garbage-collected values.
unsafe impl Trace for SharedTable {
    empty_trace!();
}

impl SharedTable {
    pub fn new(table: ConnectionTable) -> Self {
        Self(Rc::new(RefCell::new(table)))
    }

    /// Run `f` against the table. Returns `None` if the table is already
    /// borrowed further up the stack.
    pub fn with<R>(&self, f: impl FnOnce(&mut ConnectionTable) -> R) -> Option<R> {
        let Ok(mut table) = self.0.try_borrow_mut() else {
            log::warn!("[WebSocket Native] Table is busy, call ignored");
            return None;
        };
        Some(f(&mut table))
    }
}

type EnvFn = fn(&[JsValue], &SharedTable, &mut Context) -> JsResult<JsValue>;

/// Native implementation and declared arity of each import, in `IMPORTS` order.
const FUNCTIONS: [(EnvFn, usize); 7] = [
    (ws_open, 1),
    (ws_revive, 1),
    (ws_write, 2),
    (ws_read, 3),
    (ws_available, 1),
    (ws_state, 1),
    (ws_close, 1),
];

fn native(f: EnvFn, table: &SharedTable) -> NativeFunction {
    NativeFunction::from_copy_closure_with_captures(
        move |_this: &JsValue, args: &[JsValue], table: &SharedTable, ctx: &mut Context| {
            f(args, table, ctx)
        },
        table.clone(),
    )
}

/// Register the `env` object with every WebSocket function on the global
/// object.
pub fn register_env(context: &mut Context, table: SharedTable) -> JsResult<()> {
    let env = {
        let mut env = ObjectInitializer::new(context);
        for (name, (f, length)) in IMPORTS.iter().zip(FUNCTIONS) {
            env.function(native(f, &table), JsString::from(*name), length);
        }
        env.build()
    };

    context.register_global_property(JsString::from(NAMESPACE), env, Attribute::all())?;
    log::info!(
        "Registered {} {} native functions",
        PLUGIN.name,
        PLUGIN.version
    );
    Ok(())
}

/// Only whole numbers in handle range name a handle. Anything else,
/// including a missing argument, names none.
fn handle_arg(args: &[JsValue]) -> Option<Handle> {
    let id = args.first()?.as_number()?;
    if id.fract() != 0.0 || !(0.0..=f64::from(i32::MAX)).contains(&id) {
        return None;
    }
    Handle::from_raw(id as i32)
}

fn array_like(value: Option<&JsValue>) -> Option<JsObject> {
    let object = value?.as_object().map(|o| o.clone());
    if object.is_none() {
        log::debug!("[WebSocket Native] Expected an Array or Uint8Array");
    }
    object
}

fn length_of(object: &JsObject, ctx: &mut Context) -> JsResult<u64> {
    object.get(js_string!("length"), ctx)?.to_length(ctx)
}

fn bytes_of(object: &JsObject, ctx: &mut Context) -> JsResult<Vec<u8>> {
    let len = length_of(object, ctx)?.min(u64::from(u32::MAX)) as u32;
    let mut bytes = Vec::new();
    for i in 0..len {
        bytes.push(object.get(i, ctx)?.to_uint8(ctx)?);
    }
    Ok(bytes)
}

// ws_open(url: string) -> number
fn ws_open(args: &[JsValue], table: &SharedTable, _ctx: &mut Context) -> JsResult<JsValue> {
    let Some(url) = args
        .first()
        .and_then(|v| v.as_string())
        .map(|s| s.to_std_string_escaped())
    else {
        log::error!("[WebSocket Native] ws_open called without a url");
        return Ok(JsValue::from(INVALID_HANDLE));
    };

    log::info!("[WebSocket Native] open({})", url);
    let id = match table.with(|t| t.open(url)) {
        Some(Ok(handle)) => handle.as_raw(),
        Some(Err(e)) => {
            log::error!("[WebSocket Native] open error: {}", e);
            INVALID_HANDLE
        }
        None => INVALID_HANDLE,
    };
    Ok(JsValue::from(id))
}

// ws_revive(id: number) -> boolean
fn ws_revive(args: &[JsValue], table: &SharedTable, _ctx: &mut Context) -> JsResult<JsValue> {
    let revived = handle_arg(args)
        .and_then(|handle| table.with(|t| t.revive(handle).is_ok()))
        .unwrap_or(false);
    Ok(JsValue::from(revived))
}

// ws_write(id: number, data: ArrayLike<number>) -> boolean
fn ws_write(args: &[JsValue], table: &SharedTable, ctx: &mut Context) -> JsResult<JsValue> {
    let (Some(handle), Some(source)) = (handle_arg(args), array_like(args.get(1))) else {
        return Ok(JsValue::from(false));
    };
    // The source is only walked once the connection is open.
    if table.with(|t| t.state(handle)) != Some(WsState::Open) {
        return Ok(JsValue::from(false));
    }
    let data = match bytes_of(&source, ctx) {
        Ok(data) => data,
        Err(e) => {
            log::debug!("[WebSocket Native] send buffer unreadable: {}", e);
            return Ok(JsValue::from(false));
        }
    };

    log::debug!("[WebSocket Native] send({}, {} bytes)", handle, data.len());
    let sent = match table.with(|t| t.write(handle, &data)) {
        Some(Ok(())) => true,
        Some(Err(e)) => {
            log::debug!("[WebSocket Native] send error: {}", e);
            false
        }
        None => false,
    };
    Ok(JsValue::from(sent))
}

// ws_read(id: number, dest: ArrayLike<number>, capacity?: number) -> number
fn ws_read(args: &[JsValue], table: &SharedTable, ctx: &mut Context) -> JsResult<JsValue> {
    let (Some(handle), Some(dest)) = (handle_arg(args), array_like(args.get(1))) else {
        return Ok(JsValue::from(NO_FRAME));
    };
    let Ok(mut capacity) = length_of(&dest, ctx) else {
        return Ok(JsValue::from(NO_FRAME));
    };
    if let Some(limit) = args.get(2).filter(|v| !v.is_undefined()) {
        let Ok(limit) = limit.to_length(ctx) else {
            return Ok(JsValue::from(NO_FRAME));
        };
        capacity = capacity.min(limit);
    }
    let Some(Some(frame_len)) = table.with(|t| t.available(handle)) else {
        return Ok(JsValue::from(NO_FRAME));
    };

    // Copy out of the table before touching script objects, which may run
    // arbitrary setters.
    let mut buf = vec![0u8; capacity.min(frame_len as u64) as usize];
    let count = match table.with(|t| t.read(handle, &mut buf)) {
        Some(Ok(count)) => count,
        Some(Err(e)) => {
            log::debug!("[WebSocket Native] read error: {}", e);
            return Ok(JsValue::from(NO_FRAME));
        }
        None => return Ok(JsValue::from(NO_FRAME)),
    };

    for (i, byte) in buf[..count].iter().enumerate() {
        if let Err(e) = dest.set(i as u32, JsValue::from(i32::from(*byte)), true, ctx) {
            log::debug!("[WebSocket Native] read buffer unwritable: {}", e);
            return Ok(JsValue::from(NO_FRAME));
        }
    }
    Ok(JsValue::from(count as i32))
}

// ws_available(id: number) -> number
fn ws_available(args: &[JsValue], table: &SharedTable, _ctx: &mut Context) -> JsResult<JsValue> {
    let available = handle_arg(args)
        .and_then(|handle| table.with(|t| t.available(handle)))
        .flatten()
        .and_then(|len| i32::try_from(len).ok())
        .unwrap_or(NO_FRAME);
    Ok(JsValue::from(available))
}

// ws_state(id: number) -> number
fn ws_state(args: &[JsValue], table: &SharedTable, _ctx: &mut Context) -> JsResult<JsValue> {
    let state = handle_arg(args)
        .and_then(|handle| table.with(|t| t.state(handle).as_raw()))
        .unwrap_or(WS_NOT_EXISTING);
    Ok(JsValue::from(state))
}

// ws_close(id: number) -> void
fn ws_close(args: &[JsValue], table: &SharedTable, _ctx: &mut Context) -> JsResult<JsValue> {
    if let Some(handle) = handle_arg(args) {
        log::info!("[WebSocket Native] close({})", handle);
        table.with(|t| t.close(handle));
    }
    Ok(JsValue::undefined())
}
