//! Human-readable rendering of Lua values for console output.

use mlua::prelude::*;

const MAX_DEPTH: usize = 4;
const INDENT: &str = "  ";

/// Render a result value. Top-level strings are shown raw, everything else
/// the way `pprint` would show it.
pub fn repr(lua: &Lua, value: &LuaValue) -> LuaResult<String> {
    if let LuaValue::String(s) = value {
        return Ok(s.to_string_lossy().to_string());
    }
    let mut out = String::new();
    write_value(lua, &mut out, value, 0)?;
    Ok(out)
}

/// Like [`repr`] but strings keep their quotes.
pub fn pretty(lua: &Lua, value: &LuaValue) -> LuaResult<String> {
    let mut out = String::new();
    write_value(lua, &mut out, value, 0)?;
    Ok(out)
}

fn tostring(lua: &Lua, value: &LuaValue) -> LuaResult<String> {
    lua.globals()
        .get::<LuaFunction>("tostring")?
        .call::<String>(value.clone())
}

fn write_value(lua: &Lua, out: &mut String, value: &LuaValue, depth: usize) -> LuaResult<()> {
    match value {
        LuaValue::String(s) => out.push_str(&format!("{:?}", s.to_string_lossy().to_string())),
        LuaValue::Table(t) => write_table(lua, out, t, depth)?,
        other => out.push_str(&tostring(lua, other)?),
    }
    Ok(())
}

fn write_table(lua: &Lua, out: &mut String, table: &LuaTable, depth: usize) -> LuaResult<()> {
    // Tables with a __tostring metamethod describe themselves.
    if has_tostring(lua, table)? {
        out.push_str(&tostring(lua, &LuaValue::Table(table.clone()))?);
        return Ok(());
    }
    if depth >= MAX_DEPTH {
        out.push_str("{...}");
        return Ok(());
    }

    let mut entries = Vec::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let (k, v) = pair?;
        entries.push((sort_key(lua, &k)?, k, v));
    }
    if entries.is_empty() {
        out.push_str("{}");
        return Ok(());
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let pad = INDENT.repeat(depth + 1);
    out.push_str("{\n");
    for (_, k, v) in &entries {
        out.push_str(&pad);
        write_key(lua, out, k)?;
        out.push_str(" = ");
        write_value(lua, out, v, depth + 1)?;
        out.push_str(",\n");
    }
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
    Ok(())
}

/// The metatable as `getmetatable` reports it. A protected metatable
/// (`__metatable` set to a non-table) counts as none.
fn metatable_of(lua: &Lua, table: &LuaTable) -> LuaResult<Option<LuaTable>> {
    let getmetatable = lua.globals().get::<LuaFunction>("getmetatable")?;
    Ok(match getmetatable.call::<LuaValue>(table.clone())? {
        LuaValue::Table(mt) => Some(mt),
        _ => None,
    })
}

fn has_tostring(lua: &Lua, table: &LuaTable) -> LuaResult<bool> {
    let Some(mt) = metatable_of(lua, table)? else {
        return Ok(false);
    };
    Ok(!matches!(mt.raw_get::<LuaValue>("__tostring")?, LuaValue::Nil))
}

/// Integer keys first in numeric order, then everything else by text.
fn sort_key(lua: &Lua, key: &LuaValue) -> LuaResult<(u8, i64, String)> {
    Ok(match key {
        LuaValue::Integer(i) => (0, *i, String::new()),
        LuaValue::String(s) => (1, 0, s.to_string_lossy().to_string()),
        other => (2, 0, tostring(lua, other)?),
    })
}

fn write_key(lua: &Lua, out: &mut String, key: &LuaValue) -> LuaResult<()> {
    match key {
        LuaValue::String(s) => {
            let s = s.to_string_lossy().to_string();
            if is_identifier(&s) {
                out.push_str(&s);
            } else {
                out.push_str(&format!("[{s:?}]"));
            }
        }
        other => {
            out.push('[');
            out.push_str(&tostring(lua, other)?);
            out.push(']');
        }
    }
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The fields of `value`: its own entries plus those inherited through a
/// metatable `__index` table. Non-tables have no fields.
pub fn vars(lua: &Lua, value: &LuaValue) -> LuaResult<LuaTable> {
    let out = lua.create_table()?;
    let LuaValue::Table(table) = value else {
        return Ok(out);
    };

    if let Some(mt) = metatable_of(lua, table)? {
        if let LuaValue::Table(base) = mt.raw_get::<LuaValue>("__index")? {
            for pair in base.pairs::<LuaValue, LuaValue>() {
                let (k, v) = pair?;
                out.raw_set(k, v)?;
            }
        }
    }
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let (k, v) = pair?;
        out.raw_set(k, v)?;
    }
    Ok(out)
}
