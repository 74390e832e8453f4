//! String commands: GET, SET, SETNX, GETSET, SETEX, STRLEN.

use bytes::Bytes;

use cinder_protocol::{reply, Frame};

use super::{aof_line, arg_str, insert, parse_int, Table};
use crate::db::Db;
use crate::entity::Entity;

/// GET key
fn get(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || match db.data.get(&key) {
        Some(entry) => match &*entry {
            Entity::Bytes(value) => reply::bulk(value.clone()),
            _ => reply::wrong_type(),
        },
        None => reply::null(),
    })
}

/// SET key value
fn set(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let value = args[1].clone();
    db.locks.with_write(&key, || {
        db.data.put(key.clone(), Entity::Bytes(value));
        db.add_aof(&aof_line("SET", args));
        reply::ok()
    })
}

/// SETNX key value
fn setnx(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let value = args[1].clone();
    db.locks.with_write(&key, || {
        let stored = db.data.put_if_absent(key.clone(), Entity::Bytes(value));
        db.add_aof(&aof_line("SETNX", args));
        reply::integer(stored as i64)
    })
}

/// GETSET key value
fn getset(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let value = args[1].clone();
    db.locks.with_write(&key, || {
        let previous = match db.data.get_mut(&key) {
            Some(mut entry) => match &mut *entry {
                Entity::Bytes(stored) => Some(std::mem::replace(stored, value.clone())),
                _ => return reply::wrong_type(),
            },
            None => {
                db.data.put(key.clone(), Entity::Bytes(value.clone()));
                None
            }
        };
        db.add_aof(&aof_line("GETSET", args));
        match previous {
            Some(old) => reply::bulk(old),
            None => reply::null(),
        }
    })
}

/// SETEX key seconds value
///
/// Expiration is not supported; the TTL argument is validated and then
/// ignored, the value is stored durably.
fn setex(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let Some(seconds) = parse_int(&args[1]) else {
        return reply::not_integer();
    };
    if seconds <= 0 {
        return reply::not_integer();
    }
    let value = args[2].clone();
    db.locks.with_write(&key, || {
        db.data.put(key.clone(), Entity::Bytes(value));
        db.add_aof(&aof_line("SETEX", args));
        reply::ok()
    })
}

/// STRLEN key
fn strlen(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || match db.data.get(&key) {
        Some(entry) => match &*entry {
            Entity::Bytes(value) => reply::integer(value.len() as i64),
            _ => reply::wrong_type(),
        },
        None => reply::null(),
    })
}

pub(super) fn register(table: &mut Table) {
    insert(table, "get", get, 2);
    insert(table, "set", set, 3);
    insert(table, "setnx", setnx, 3);
    insert(table, "getset", getset, 3);
    insert(table, "setex", setex, 4);
    insert(table, "strlen", strlen, 2);
}
