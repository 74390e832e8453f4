//! Generic key commands: DEL, EXISTS, FLUSHDB, TYPE, RENAME, RENAMENX, KEYS.

use bytes::Bytes;

use cinder_protocol::{reply, Frame};

use super::{aof_line, arg_str, insert, Table};
use crate::db::Db;
use crate::pattern::glob_match;

/// DEL key [key ...]
fn del(db: &Db, args: &[Bytes]) -> Frame {
    let keys: Vec<String> = args.iter().map(arg_str).collect();
    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();

    let deleted = db.locks.with_write_many(&refs, || {
        let mut deleted = 0;
        for key in &keys {
            deleted += db.remove_key(key);
        }
        if deleted > 0 {
            db.add_aof(&aof_line("DEL", args));
        }
        deleted
    });
    reply::integer(deleted as i64)
}

/// EXISTS key [key ...]
fn exists(db: &Db, args: &[Bytes]) -> Frame {
    let keys: Vec<String> = args.iter().map(arg_str).collect();
    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();

    let found = db.locks.with_read_many(&refs, || {
        keys.iter()
            .filter(|key| db.data.get(key.as_str()).is_some())
            .count()
    });
    reply::integer(found as i64)
}

/// FLUSHDB
fn flushdb(db: &Db, args: &[Bytes]) -> Frame {
    db.flush();
    db.add_aof(&aof_line("FLUSHDB", args));
    reply::ok()
}

/// TYPE key
fn key_type(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || match db.data.get(&key) {
        Some(entry) => Frame::Simple(entry.type_name().into()),
        None => Frame::Simple("none".into()),
    })
}

/// RENAME key newkey
fn rename(db: &Db, args: &[Bytes]) -> Frame {
    let src = arg_str(&args[0]);
    let dst = arg_str(&args[1]);

    db.locks.with_write_many(&[&src, &dst], || {
        let Some(entity) = db.data.take(&src) else {
            return reply::no_such_key();
        };
        db.locks.mark_removed(&src);
        db.data.put(dst.clone(), entity);
        db.add_aof(&aof_line("RENAME", args));
        reply::ok()
    })
}

/// RENAMENX key newkey
fn renamenx(db: &Db, args: &[Bytes]) -> Frame {
    let src = arg_str(&args[0]);
    let dst = arg_str(&args[1]);

    db.locks.with_write_many(&[&src, &dst], || {
        if db.data.get(&src).is_none() {
            return reply::no_such_key();
        }
        if db.data.get(&dst).is_some() {
            return reply::integer(0);
        }
        let Some(entity) = db.data.take(&src) else {
            return reply::no_such_key();
        };
        db.locks.mark_removed(&src);
        db.data.put(dst.clone(), entity);
        db.add_aof(&aof_line("RENAMENX", args));
        reply::integer(1)
    })
}

/// KEYS pattern
fn keys(db: &Db, args: &[Bytes]) -> Frame {
    let pattern = arg_str(&args[0]);
    let mut matched: Vec<Bytes> = Vec::new();
    db.data.for_each(|key, _| {
        if glob_match(&pattern, key) {
            matched.push(Bytes::copy_from_slice(key.as_bytes()));
        }
        true
    });
    reply::bulk_array(matched)
}

pub(super) fn register(table: &mut Table) {
    insert(table, "del", del, -2);
    insert(table, "exists", exists, -2);
    insert(table, "flushdb", flushdb, -1);
    insert(table, "type", key_type, 2);
    insert(table, "rename", rename, 3);
    insert(table, "renamenx", renamenx, 3);
    insert(table, "keys", keys, 2);
}
