//! Raw userdata memory access.

use vm::{Type, Vm};

use super::{check_int, check_str, OpResult};
use crate::error::OpError;
use crate::marshal;

/// `udread(u, offset, count)` — a copy of raw userdata memory.
///
/// The window is clipped to the payload; nothing is returned when `offset`
/// is past the end or `count` is not positive.
pub fn udread(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    let offset = check_int(dbg, 2)?;
    let count = check_int(dbg, 3)?;
    dbg.set_top(1);

    if marshal::copy_to_host(dbg, host)?.is_none() {
        return Err(OpError::NeedUserdata);
    }
    if host.type_of(-1) != Some(Type::Userdata) {
        host.pop(1);
        return Err(OpError::NeedUserdata);
    }

    let ud = host.to_userdata(-1).ok_or(OpError::NeedUserdata)?;
    let len = ud.borrow().len();

    if offset < 0 || offset as usize >= len || count <= 0 {
        host.pop(1);
        return Ok(0);
    }

    let offset = offset as usize;
    let count = (count as usize).min(len - offset);
    let bytes = ud.borrow().bytes()[offset..offset + count].to_vec();
    host.pop(1);

    dbg.push_str(bytes);
    Ok(1)
}

/// `udwrite(u, offset, data, partial?)` — write into raw userdata memory.
///
/// With `partial`, writes as much as fits and reports the byte count. Without
/// it, writes only when the whole range fits and reports a boolean.
pub fn udwrite(dbg: &mut Vm, host: &mut Vm) -> OpResult {
    let offset = check_int(dbg, 2)?;
    let data = check_str(dbg, 3)?;
    let allow_partial = dbg.to_bool(4);
    dbg.set_top(1);

    if marshal::copy_to_host(dbg, host)?.is_none() {
        return Err(OpError::NeedUserdata);
    }
    if host.type_of(-1) != Some(Type::Userdata) {
        host.pop(1);
        return Err(OpError::NeedUserdata);
    }

    let ud = host.to_userdata(-1).ok_or(OpError::NeedUserdata)?;
    let len = ud.borrow().len();
    host.pop(1);

    if allow_partial {
        if offset < 0 || offset as usize >= len {
            dbg.push_int(0);
            return Ok(1);
        }

        let offset = offset as usize;
        let written = data.len().min(len - offset);
        ud.borrow_mut().bytes_mut()[offset..offset + written]
            .copy_from_slice(&data.as_bytes()[..written]);

        dbg.push_int(written as i64);
        Ok(1)
    } else {
        if offset < 0 || offset as usize + data.len() > len {
            dbg.push_bool(false);
            return Ok(1);
        }

        let offset = offset as usize;
        ud.borrow_mut().bytes_mut()[offset..offset + data.len()]
            .copy_from_slice(data.as_bytes());

        dbg.push_bool(true);
        Ok(1)
    }
}
