//! Deferred asynchronous calls.
//!
//! `async(fn, ...)` captures a function and its arguments without running it.
//! Awaiting runs the call on the async executor and consumes the value; a
//! second await of the same value is an error.

use std::cell::RefCell;

use mlua::prelude::*;

/// How many awaitable layers `debug` unwraps before giving up.
pub const AWAIT_DEPTH: usize = 2;

pub struct Awaitable {
    pending: RefCell<Option<(LuaFunction, LuaVariadic<LuaValue>)>>,
}

impl Awaitable {
    pub fn new(func: LuaFunction, args: LuaVariadic<LuaValue>) -> Self {
        Self {
            pending: RefCell::new(Some((func, args))),
        }
    }
}

impl LuaUserData for Awaitable {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
            Ok(if this.pending.borrow().is_some() {
                "<awaitable>"
            } else {
                "<awaitable (consumed)>"
            })
        });
    }
}

/// `Some` if `value` is an awaitable that has not been awaited yet.
fn take_pending(value: &LuaValue) -> LuaResult<Option<(LuaFunction, LuaVariadic<LuaValue>)>> {
    let LuaValue::UserData(ud) = value else {
        return Ok(None);
    };
    if !ud.is::<Awaitable>() {
        return Ok(None);
    }
    let this = ud.borrow::<Awaitable>()?;
    let taken = this.pending.borrow_mut().take();
    taken
        .map(Some)
        .ok_or_else(|| LuaError::runtime("cannot await an awaitable twice"))
}

pub fn is_awaitable(value: &LuaValue) -> bool {
    matches!(value, LuaValue::UserData(ud) if ud.is::<Awaitable>())
}

/// Await `value` once if it is awaitable, otherwise hand it back untouched.
pub async fn resolve_once(value: LuaValue) -> LuaResult<LuaValue> {
    match take_pending(&value)? {
        Some((func, args)) => func.call_async::<LuaValue>(args).await,
        None => Ok(value),
    }
}

/// Unwrap at most [`AWAIT_DEPTH`] awaitable layers.
///
/// A value nested deeper comes back still awaitable.
pub async fn maybe_await(mut value: LuaValue) -> LuaResult<LuaValue> {
    for _ in 0..AWAIT_DEPTH {
        if !is_awaitable(&value) {
            return Ok(value);
        }
        value = resolve_once(value).await?;
    }
    Ok(value)
}

/// Register `async(fn, ...)` and `await(value)`.
pub fn register(lua: &Lua) -> LuaResult<()> {
    let make = lua.create_function(|lua, (func, args): (LuaFunction, LuaVariadic<LuaValue>)| {
        lua.create_userdata(Awaitable::new(func, args))
    })?;
    lua.globals().set("async", make)?;

    let await_fn = lua.create_async_function(|_, value: LuaValue| resolve_once(value))?;
    lua.globals().set("await", await_fn)?;

    Ok(())
}
