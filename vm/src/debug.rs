use crate::func::Callable;
use crate::value::{LuaStr, Value};
use crate::vm::Vm;

/// Debug record for a frame or function, the `lua_Debug` shape.
///
/// Every field is always populated here; the caller decides which fields it
/// was asked for. `-1` marks line information that does not exist (native
/// functions, no current line).
#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub source: LuaStr,
    pub short_src: String,
    pub line_defined: i32,
    pub last_line_defined: i32,
    pub what: &'static str,
    pub current_line: i32,
    pub name: Option<LuaStr>,
    pub name_what: Option<&'static str>,
    pub nparams: u8,
    pub is_tailcall: bool,
    pub ftransfer: i32,
    pub ntransfer: i32,
}

/// Derive the display form of a chunk name.
///
/// `=name` strips the marker, `@file` names a file, anything else is inline
/// source and gets clipped into `[string "..."]`. Clipping counts chars, not
/// bytes; chunk names are arbitrary and a cut inside a multi-byte char must
/// not panic.
pub fn short_src(source: &LuaStr) -> String {
    const LIMIT: usize = 60;

    let bytes = source.as_bytes();
    match bytes.first() {
        Some(b'=') => String::from_utf8_lossy(&bytes[1..]).chars().take(LIMIT).collect(),
        Some(b'@') => {
            let name = String::from_utf8_lossy(&bytes[1..]);
            if name.len() <= LIMIT {
                name.into_owned()
            } else {
                // keep the tail of the path
                let cut = name
                    .char_indices()
                    .rev()
                    .nth(LIMIT - 3 - 1)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                format!("...{}", &name[cut..])
            }
        }
        _ => {
            let line = String::from_utf8_lossy(bytes);
            let line = line.lines().next().unwrap_or("");
            if line.chars().count() > LIMIT - 15 {
                let head: String = line.chars().take(LIMIT - 15).collect();
                format!("[string \"{head}...\"]")
            } else {
                format!("[string \"{line}\"]")
            }
        }
    }
}

fn native_info() -> DebugInfo {
    DebugInfo {
        source: "=[C]".into(),
        short_src: "[C]".to_string(),
        line_defined: -1,
        last_line_defined: -1,
        what: "C",
        current_line: -1,
        name: None,
        name_what: None,
        nparams: 0,
        is_tailcall: false,
        ftransfer: 0,
        ntransfer: 0,
    }
}

fn callable_info(callable: &Callable, current_line: i32) -> DebugInfo {
    match callable {
        Callable::Native(_) => native_info(),
        Callable::Lua(c) => {
            let proto = &c.proto;

            DebugInfo {
                source: proto.chunk_name.clone(),
                short_src: short_src(&proto.chunk_name),
                line_defined: proto.line_defined,
                last_line_defined: proto.last_line_defined,
                what: if proto.is_main { "main" } else { "Lua" },
                current_line,
                name: None,
                name_what: None,
                nparams: proto.nparams,
                is_tailcall: false,
                ftransfer: 0,
                ntransfer: 0,
            }
        }
    }
}

impl Vm {
    /// Number of live activation records; level 0 is the innermost.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame_index(&self, level: usize) -> Option<usize> {
        self.frames.len().checked_sub(level + 1)
    }

    /// Push local `slot` of the frame at `level` and return its name.
    ///
    /// Positive slots address registers; negative slots address varargs.
    /// `None` leaves the stack untouched.
    pub fn get_local(&mut self, level: usize, slot: i16) -> Option<LuaStr> {
        let fidx = self.frame_index(level)?;

        let (value, name) = {
            let frame = &self.frames[fidx];

            if slot < 0 {
                let i = (-(slot as i32)) as usize - 1;
                let v = frame.varargs.get(i)?.clone();
                (v, LuaStr::from("(vararg)"))
            } else if slot == 0 {
                return None;
            } else {
                let s = slot as usize;
                match &frame.callable {
                    Callable::Lua(c) => {
                        if s > frame.nregs {
                            return None;
                        }
                        let v = self.stack.get(frame.base + s)?.clone();
                        let name = c
                            .proto
                            .local_name((s - 1) as u8)
                            .cloned()
                            .unwrap_or_else(|| "(temporary)".into());
                        (v, name)
                    }
                    Callable::Native(_) => {
                        let ceiling = self
                            .frames
                            .get(fidx + 1)
                            .map(|f| f.base)
                            .unwrap_or(self.stack.len());
                        let pos = frame.base + s;
                        if pos >= ceiling {
                            return None;
                        }
                        (self.stack[pos].clone(), "(C temporary)".into())
                    }
                }
            }
        };

        self.push(value);
        Some(name)
    }

    /// Pop the top value into local `slot` of the frame at `level`.
    ///
    /// The value is consumed only on success, as `lua_setlocal` does.
    pub fn set_local(&mut self, level: usize, slot: i16) -> Option<LuaStr> {
        let fidx = self.frame_index(level)?;
        self.stack.last()?;

        enum Place {
            Vararg(usize),
            Stack(usize),
        }

        let (place, name) = {
            let frame = &self.frames[fidx];

            if slot < 0 {
                let i = (-(slot as i32)) as usize - 1;
                if i >= frame.varargs.len() {
                    return None;
                }
                (Place::Vararg(i), LuaStr::from("(vararg)"))
            } else if slot == 0 {
                return None;
            } else {
                let s = slot as usize;
                match &frame.callable {
                    Callable::Lua(c) => {
                        if s > frame.nregs || frame.base + s >= self.stack.len() {
                            return None;
                        }
                        let name = c
                            .proto
                            .local_name((s - 1) as u8)
                            .cloned()
                            .unwrap_or_else(|| "(temporary)".into());
                        (Place::Stack(frame.base + s), name)
                    }
                    Callable::Native(_) => {
                        let ceiling = self
                            .frames
                            .get(fidx + 1)
                            .map(|f| f.base)
                            // the value to be stored sits on top
                            .unwrap_or(self.stack.len() - 1);
                        let pos = frame.base + s;
                        if pos >= ceiling {
                            return None;
                        }
                        (Place::Stack(pos), "(C temporary)".into())
                    }
                }
            }
        };

        let value = self.stack.pop().expect("checked non-empty above");
        match place {
            Place::Vararg(i) => self.frames[fidx].varargs[i] = value,
            Place::Stack(pos) => self.stack[pos] = value,
        }

        Some(name)
    }

    /// Push the function running in the frame at `level`.
    pub fn push_frame_function(&mut self, level: usize) -> bool {
        let Some(fidx) = self.frame_index(level) else {
            return false;
        };

        let c = self.frames[fidx].callable.clone();
        self.push(Value::Function(c));
        true
    }

    /// Push upvalue `n` of the function at `idx` and return its name.
    pub fn get_upvalue(&mut self, idx: i32, n: usize) -> Option<LuaStr> {
        let c = self.to_callable(idx)?;
        let (name, value) = c.upvalue(n)?;
        self.push(value);

        Some(name)
    }

    /// Pop the top value into upvalue `n` of the function at `idx`.
    ///
    /// The value is consumed only on success.
    pub fn set_upvalue(&mut self, idx: i32, n: usize) -> Option<LuaStr> {
        let c = self.to_callable(idx)?;
        let value = self.stack.last()?.clone();
        let name = c.set_upvalue(n, value)?;
        self.pop(1);

        Some(name)
    }

    /// Debug record for the frame at `level`.
    pub fn stack_info(&self, level: usize) -> Option<DebugInfo> {
        let fidx = self.frame_index(level)?;
        let frame = &self.frames[fidx];

        let current_line = match &frame.callable {
            Callable::Native(_) => -1,
            Callable::Lua(c) => frame
                .ip
                .checked_sub(1)
                .and_then(|ip| c.proto.line_at(ip))
                .map(|l| l as i32)
                .unwrap_or(-1),
        };

        let mut r = callable_info(&frame.callable, current_line);
        if let Some((name, what)) = &frame.name {
            r.name = Some(name.clone());
            r.name_what = Some(*what);
        }

        Some(r)
    }

    /// Debug record for the function on top of the stack; pops it.
    ///
    /// There is no call context, so line and name information is absent.
    pub fn function_info(&mut self) -> Option<DebugInfo> {
        let c = self.to_callable(-1)?;
        self.pop(1);

        Some(callable_info(&c, -1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_src_forms() {
        assert_eq!(short_src(&"=demo".into()), "demo");
        assert_eq!(short_src(&"@init.lua".into()), "init.lua");
        assert_eq!(short_src(&"return 1".into()), "[string \"return 1\"]");
    }

    #[test]
    fn short_src_clips_long_paths_on_char_boundaries() {
        let path = format!("@/mnt/{}/init.lua", "ü".repeat(60));
        let r = short_src(&path.as_str().into());
        assert!(r.starts_with("..."));
        assert!(r.ends_with("/init.lua"));
        assert_eq!(r.chars().count(), 60);
    }

    #[test]
    fn short_src_clips_inline_source_on_char_boundaries() {
        let src = format!("résumé = \"{}\"", "é".repeat(50));
        let r = short_src(&src.as_str().into());
        assert!(r.starts_with("[string \"r"));
        assert!(r.ends_with("...\"]"));
        assert_eq!(r.chars().count(), 45 + "[string \"...\"]".chars().count());
    }
}
