//! Hash commands: HSET, HGET, HEXISTS, HDEL, HLEN, HGETALL, HKEYS,
//! HVALS, HMGET, HMSET, HSETNX, HENCODING.

use bytes::Bytes;

use cinder_protocol::{reply, Frame};

use super::{aof_line, arg_str, insert, Table};
use crate::db::Db;
use crate::entity::Entity;
use crate::types::Hash;

/// Runs `f` against the hash at `key`, or yields the WRONGTYPE error.
/// `missing` is returned when the key is absent.
fn with_hash<T>(
    db: &Db,
    key: &str,
    missing: T,
    f: impl FnOnce(&Hash) -> T,
) -> Result<T, Frame> {
    match db.data.get(key) {
        Some(entry) => match &*entry {
            Entity::Hash(hash) => Ok(f(hash)),
            _ => Err(reply::wrong_type()),
        },
        None => Ok(missing),
    }
}

/// HSET key field value
fn hset(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let field = arg_str(&args[1]);
    let value = arg_str(&args[2]);

    db.locks.with_write(&key, || {
        let added = {
            let Some(mut entry) = db.data.get_or_insert_with(&key, || Entity::Hash(Hash::new()))
            else {
                return reply::integer(0);
            };
            match &mut *entry {
                Entity::Hash(hash) => hash.set(&field, &value),
                _ => return reply::wrong_type(),
            }
        };
        db.add_aof(&aof_line("HSET", args));
        reply::integer(added)
    })
}

/// HGET key field
fn hget(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let field = arg_str(&args[1]);
    db.locks.with_read(&key, || {
        match with_hash(db, &key, None, |hash| hash.get(&field).map(str::to_owned)) {
            Ok(Some(value)) => reply::bulk(value),
            Ok(None) => reply::null(),
            Err(err) => err,
        }
    })
}

/// HEXISTS key field
fn hexists(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let field = arg_str(&args[1]);
    db.locks.with_read(&key, || {
        match with_hash(db, &key, false, |hash| hash.exists(&field)) {
            Ok(found) => reply::integer(found as i64),
            Err(err) => err,
        }
    })
}

/// HDEL key field [field ...]
fn hdel(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);

    db.locks.with_write(&key, || {
        let mut now_empty = false;
        let deleted = {
            let Some(mut entry) = db.data.get_mut(&key) else {
                return reply::integer(0);
            };
            match &mut *entry {
                Entity::Hash(hash) => {
                    let mut deleted = 0;
                    for field in &args[1..] {
                        deleted += hash.delete(&arg_str(field));
                    }
                    now_empty = hash.is_empty();
                    deleted
                }
                _ => return reply::wrong_type(),
            }
        };
        if now_empty {
            db.remove_key(&key);
        }
        if deleted > 0 {
            db.add_aof(&aof_line("HDEL", args));
        }
        reply::integer(deleted)
    })
}

/// HLEN key
fn hlen(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || {
        match with_hash(db, &key, 0, |hash| hash.len()) {
            Ok(len) => reply::integer(len as i64),
            Err(err) => err,
        }
    })
}

/// HGETALL key
fn hgetall(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || {
        match with_hash(db, &key, Vec::new(), |hash| hash.get_all()) {
            Ok(pairs) => {
                let mut flat: Vec<Bytes> = Vec::with_capacity(pairs.len() * 2);
                for (field, value) in pairs {
                    flat.push(Bytes::from(field));
                    flat.push(Bytes::from(value));
                }
                reply::bulk_array(flat)
            }
            Err(err) => err,
        }
    })
}

/// HKEYS key
fn hkeys(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || {
        match with_hash(db, &key, Vec::new(), |hash| hash.fields()) {
            Ok(fields) => reply::bulk_array(fields.into_iter().map(Bytes::from)),
            Err(err) => err,
        }
    })
}

/// HVALS key
fn hvals(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || {
        match with_hash(db, &key, Vec::new(), |hash| hash.values()) {
            Ok(values) => reply::bulk_array(values.into_iter().map(Bytes::from)),
            Err(err) => err,
        }
    })
}

/// HMGET key field [field ...]
fn hmget(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || {
        let fields = &args[1..];
        let lookup = with_hash(db, &key, vec![None; fields.len()], |hash| {
            fields
                .iter()
                .map(|f| hash.get(&arg_str(f)).map(|v| Bytes::from(v.to_owned())))
                .collect()
        });
        match lookup {
            Ok(values) => reply::multi_bulk(values),
            Err(err) => err,
        }
    })
}

/// HMSET key field value [field value ...]
fn hmset(db: &Db, args: &[Bytes]) -> Frame {
    if args.len() % 2 == 0 {
        return reply::arg_num_err("hmset");
    }
    let key = arg_str(&args[0]);

    db.locks.with_write(&key, || {
        {
            let Some(mut entry) = db.data.get_or_insert_with(&key, || Entity::Hash(Hash::new()))
            else {
                return reply::ok();
            };
            match &mut *entry {
                Entity::Hash(hash) => {
                    for pair in args[1..].chunks_exact(2) {
                        hash.set(&arg_str(&pair[0]), &arg_str(&pair[1]));
                    }
                }
                _ => return reply::wrong_type(),
            }
        }
        db.add_aof(&aof_line("HMSET", args));
        reply::ok()
    })
}

/// HSETNX key field value
fn hsetnx(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let field = arg_str(&args[1]);
    let value = arg_str(&args[2]);

    db.locks.with_write(&key, || {
        let stored = {
            let Some(mut entry) = db.data.get_or_insert_with(&key, || Entity::Hash(Hash::new()))
            else {
                return reply::integer(0);
            };
            match &mut *entry {
                Entity::Hash(hash) => {
                    if hash.exists(&field) {
                        false
                    } else {
                        hash.set(&field, &value);
                        true
                    }
                }
                _ => return reply::wrong_type(),
            }
        };
        if stored {
            db.add_aof(&aof_line("HSETNX", args));
            reply::integer(1)
        } else {
            reply::integer(0)
        }
    })
}

/// HENCODING key — 0 while compact, 1 once expanded.
fn hencoding(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || {
        match db.data.get(&key) {
            Some(entry) => match &*entry {
                Entity::Hash(hash) => reply::integer(hash.encoding().code()),
                _ => reply::wrong_type(),
            },
            None => reply::null(),
        }
    })
}

pub(super) fn register(table: &mut Table) {
    insert(table, "hset", hset, 4);
    insert(table, "hget", hget, 3);
    insert(table, "hexists", hexists, 3);
    insert(table, "hdel", hdel, -3);
    insert(table, "hlen", hlen, 2);
    insert(table, "hgetall", hgetall, 2);
    insert(table, "hkeys", hkeys, 2);
    insert(table, "hvals", hvals, 2);
    insert(table, "hmget", hmget, -3);
    insert(table, "hmset", hmset, -4);
    insert(table, "hsetnx", hsetnx, 4);
    insert(table, "hencoding", hencoding, 2);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(parts: &[&str]) -> Vec<Bytes> {
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect()
    }

    #[test]
    fn hset_hget_round_trip() {
        let db = Db::new(0);
        assert_eq!(db.exec(&line(&["HSET", "h", "f", "v"])), Frame::Integer(1));
        assert_eq!(db.exec(&line(&["HSET", "h", "f", "w"])), Frame::Integer(0));
        assert_eq!(db.exec(&line(&["HGET", "h", "f"])), Frame::Bulk(Bytes::from("w")));
        assert_eq!(db.exec(&line(&["HGET", "h", "nope"])), Frame::Null);
        assert_eq!(db.exec(&line(&["HGET", "missing", "f"])), Frame::Null);
    }

    #[test]
    fn hset_on_wrong_type() {
        let db = Db::new(0);
        db.exec(&line(&["SET", "k", "v"]));
        assert_eq!(db.exec(&line(&["HSET", "k", "f", "v"])), reply::wrong_type());
    }

    #[test]
    fn hdel_removes_and_reports() {
        let db = Db::new(0);
        db.exec(&line(&["HSET", "h", "a", "1"]));
        db.exec(&line(&["HSET", "h", "b", "2"]));
        assert_eq!(db.exec(&line(&["HDEL", "h", "a", "ghost"])), Frame::Integer(1));
        assert_eq!(db.exec(&line(&["HLEN", "h"])), Frame::Integer(1));
    }

    #[test]
    fn hdel_last_field_removes_key() {
        let db = Db::new(0);
        db.exec(&line(&["HSET", "h", "only", "v"]));
        assert_eq!(db.exec(&line(&["HDEL", "h", "only"])), Frame::Integer(1));
        assert_eq!(db.exec(&line(&["EXISTS", "h"])), Frame::Integer(0));
        assert_eq!(db.exec(&line(&["TYPE", "h"])), Frame::Simple("none".into()));
    }

    #[test]
    fn hexists_and_hlen() {
        let db = Db::new(0);
        db.exec(&line(&["HSET", "h", "f", "v"]));
        assert_eq!(db.exec(&line(&["HEXISTS", "h", "f"])), Frame::Integer(1));
        assert_eq!(db.exec(&line(&["HEXISTS", "h", "g"])), Frame::Integer(0));
        assert_eq!(db.exec(&line(&["HEXISTS", "no", "f"])), Frame::Integer(0));
        assert_eq!(db.exec(&line(&["HLEN", "h"])), Frame::Integer(1));
        assert_eq!(db.exec(&line(&["HLEN", "no"])), Frame::Integer(0));
    }

    #[test]
    fn hgetall_interleaves_pairs() {
        let db = Db::new(0);
        db.exec(&line(&["HSET", "h", "a", "1"]));
        let rep = db.exec(&line(&["HGETALL", "h"]));
        assert_eq!(
            rep,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("a")),
                Frame::Bulk(Bytes::from("1")),
            ])
        );
        assert_eq!(db.exec(&line(&["HGETALL", "none"])), reply::empty_array());
    }

    #[test]
    fn hmget_preserves_field_order() {
        let db = Db::new(0);
        db.exec(&line(&["HMSET", "h", "a", "1", "b", "2"]));
        let rep = db.exec(&line(&["HMGET", "h", "b", "ghost", "a"]));
        assert_eq!(
            rep,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("2")),
                Frame::Null,
                Frame::Bulk(Bytes::from("1")),
            ])
        );
        // missing key: all-nil row of the right width
        let rep = db.exec(&line(&["HMGET", "none", "a", "b"]));
        assert_eq!(rep, Frame::Array(vec![Frame::Null, Frame::Null]));
    }

    #[test]
    fn hmset_requires_pairs() {
        let db = Db::new(0);
        assert!(reply::is_error(&db.exec(&line(&["HMSET", "h", "a", "1", "b"]))));
        assert_eq!(db.exec(&line(&["HMSET", "h", "a", "1", "b", "2"])), reply::ok());
        assert_eq!(db.exec(&line(&["HLEN", "h"])), Frame::Integer(2));
    }

    #[test]
    fn hsetnx_sets_once() {
        let db = Db::new(0);
        assert_eq!(db.exec(&line(&["HSETNX", "h", "f", "v"])), Frame::Integer(1));
        assert_eq!(db.exec(&line(&["HSETNX", "h", "f", "w"])), Frame::Integer(0));
        assert_eq!(db.exec(&line(&["HGET", "h", "f"])), Frame::Bulk(Bytes::from("v")));
    }

    #[test]
    fn hencoding_reports_upgrade() {
        let db = Db::new(0);
        for i in 0..512 {
            db.exec(&line(&["HSET", "h", &format!("f{i}"), "v"]));
        }
        assert_eq!(db.exec(&line(&["HENCODING", "h"])), Frame::Integer(0));
        db.exec(&line(&["HSET", "h", "f512", "v"]));
        assert_eq!(db.exec(&line(&["HENCODING", "h"])), Frame::Integer(1));
        assert_eq!(db.exec(&line(&["HLEN", "h"])), Frame::Integer(513));
        assert_eq!(db.exec(&line(&["HENCODING", "none"])), Frame::Null);
    }

    #[test]
    fn hkeys_hvals() {
        let db = Db::new(0);
        db.exec(&line(&["HMSET", "h", "a", "1", "b", "2"]));
        let Frame::Array(fields) = db.exec(&line(&["HKEYS", "h"])) else {
            panic!("expected array");
        };
        assert_eq!(fields.len(), 2);
        let Frame::Array(values) = db.exec(&line(&["HVALS", "h"])) else {
            panic!("expected array");
        };
        assert_eq!(values.len(), 2);
    }
}
