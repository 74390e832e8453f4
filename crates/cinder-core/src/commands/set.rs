//! Set commands: SADD, SREM, SISMEMBER, SMEMBERS, SCARD, SPOP,
//! SRANDMEMBER, SMOVE, the SUNION/SINTER/SDIFF family and their STORE
//! variants, SSCAN, SENCODING.

use bytes::Bytes;

use cinder_protocol::{reply, Frame};

use super::{aof_line, arg_str, insert, parse_int, Table};
use crate::db::Db;
use crate::entity::Entity;
use crate::pattern::glob_match;
use crate::types::Set;

/// Clones the set stored at `key`. `Ok(None)` means absent.
fn load_set(db: &Db, key: &str) -> Result<Option<Set>, Frame> {
    match db.data.get(key) {
        Some(entry) => match &*entry {
            Entity::Set(set) => Ok(Some(set.clone())),
            _ => Err(reply::wrong_type()),
        },
        None => Ok(None),
    }
}

/// SADD key member [member ...]
fn sadd(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_write(&key, || {
        let added = {
            let Some(mut entry) = db.data.get_or_insert_with(&key, || Entity::Set(Set::new()))
            else {
                return reply::integer(0);
            };
            match &mut *entry {
                Entity::Set(set) => {
                    let mut added = 0;
                    for member in &args[1..] {
                        if set.add(&arg_str(member)) {
                            added += 1;
                        }
                    }
                    added
                }
                _ => return reply::wrong_type(),
            }
        };
        db.add_aof(&aof_line("SADD", args));
        reply::integer(added)
    })
}

/// SREM key member [member ...]
fn srem(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_write(&key, || {
        let mut now_empty = false;
        let removed = {
            let Some(mut entry) = db.data.get_mut(&key) else {
                return reply::integer(0);
            };
            match &mut *entry {
                Entity::Set(set) => {
                    let mut removed = 0;
                    for member in &args[1..] {
                        if set.remove(&arg_str(member)) {
                            removed += 1;
                        }
                    }
                    now_empty = set.is_empty();
                    removed
                }
                _ => return reply::wrong_type(),
            }
        };
        if now_empty {
            db.remove_key(&key);
        }
        db.add_aof(&aof_line("SREM", args));
        reply::integer(removed)
    })
}

/// SISMEMBER key member
fn sismember(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let member = arg_str(&args[1]);
    db.locks.with_read(&key, || match db.data.get(&key) {
        Some(entry) => match &*entry {
            Entity::Set(set) => reply::integer(set.contains(&member) as i64),
            _ => reply::wrong_type(),
        },
        None => reply::integer(0),
    })
}

/// SMEMBERS key
fn smembers(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || match load_set(db, &key) {
        Ok(Some(set)) => reply::bulk_array(set.members().into_iter().map(Bytes::from)),
        Ok(None) => reply::empty_array(),
        Err(err) => err,
    })
}

/// SCARD key
fn scard(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || match db.data.get(&key) {
        Some(entry) => match &*entry {
            Entity::Set(set) => reply::integer(set.len() as i64),
            _ => reply::wrong_type(),
        },
        None => reply::integer(0),
    })
}

/// SPOP key [count]
///
/// The journal records the popped members as an SREM so replay removes
/// exactly what this call removed instead of re-rolling the dice.
fn spop(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let single = args.len() == 1;
    let count = if single {
        1
    } else {
        match parse_int(&args[1]) {
            Some(n) if n > 0 => n as usize,
            _ => return reply::error("ERR value is out of range, must be positive"),
        }
    };

    db.locks.with_write(&key, || {
        let mut now_empty = false;
        let popped = {
            let Some(mut entry) = db.data.get_mut(&key) else {
                return reply::null();
            };
            match &mut *entry {
                Entity::Set(set) => {
                    let popped = set.pop(count);
                    now_empty = set.is_empty();
                    popped
                }
                _ => return reply::wrong_type(),
            }
        };
        if now_empty {
            db.remove_key(&key);
        }
        if popped.is_empty() {
            return reply::null();
        }

        let mut journal: Vec<Bytes> = Vec::with_capacity(popped.len() + 1);
        journal.push(args[0].clone());
        journal.extend(popped.iter().map(|m| Bytes::from(m.clone())));
        db.add_aof(&aof_line("SREM", &journal));

        if single {
            reply::bulk(Bytes::from(popped.into_iter().next().unwrap_or_default()))
        } else {
            reply::bulk_array(popped.into_iter().map(Bytes::from))
        }
    })
}

/// SRANDMEMBER key [count]
///
/// Positive count samples distinct members, negative count samples with
/// replacement, no count returns a single member.
fn srandmember(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let single = args.len() == 1;
    let count = if single {
        1
    } else {
        match parse_int(&args[1]) {
            Some(n) => n,
            None => return reply::not_integer(),
        }
    };

    db.locks.with_read(&key, || {
        let set = match load_set(db, &key) {
            Ok(Some(set)) => set,
            Ok(None) => {
                return if single {
                    reply::null()
                } else {
                    reply::empty_array()
                };
            }
            Err(err) => return err,
        };

        let members = if single {
            set.random_member().into_iter().collect()
        } else if count > 0 {
            set.random_distinct(count as usize)
        } else {
            set.random_with_replacement(count.unsigned_abs() as usize)
        };

        if members.is_empty() && single {
            return reply::null();
        }
        if single {
            reply::bulk(Bytes::from(members.into_iter().next().unwrap_or_default()))
        } else {
            reply::bulk_array(members.into_iter().map(Bytes::from))
        }
    })
}

/// SMOVE source destination member
fn smove(db: &Db, args: &[Bytes]) -> Frame {
    let src = arg_str(&args[0]);
    let dst = arg_str(&args[1]);
    let member = arg_str(&args[2]);

    // same-key move is a membership probe, not a mutation
    if src == dst {
        return db.locks.with_write(&src, || match load_set(db, &src) {
            Ok(Some(set)) => reply::integer(set.contains(&member) as i64),
            Ok(None) => reply::integer(0),
            Err(err) => err,
        });
    }

    db.locks.with_write_many(&[&src, &dst], || {
        match load_set(db, &src) {
            Ok(Some(set)) if set.contains(&member) => {}
            Ok(_) => return reply::integer(0),
            Err(err) => return err,
        }
        // destination must be set-typed before the source is touched
        if let Some(entry) = db.data.get(&dst) {
            if !matches!(&*entry, Entity::Set(_)) {
                return reply::wrong_type();
            }
        }

        let mut src_empty = false;
        if let Some(mut entry) = db.data.get_mut(&src) {
            if let Entity::Set(set) = &mut *entry {
                set.remove(&member);
                src_empty = set.is_empty();
            }
        }
        if src_empty {
            db.remove_key(&src);
        }

        if let Some(mut entry) = db.data.get_or_insert_with(&dst, || Entity::Set(Set::new())) {
            if let Entity::Set(set) = &mut *entry {
                set.add(&member);
            }
        }

        db.add_aof(&aof_line("SMOVE", args));
        reply::integer(1)
    })
}

/// How a missing source key folds into a set algebra command.
enum MissingKey {
    /// SUNION and later SDIFF operands: contributes nothing.
    Skip,
    /// SINTER, and the first SDIFF operand: the result is empty.
    EmptyResult,
}

/// Collects the sets named by `keys`, applying the `missing` policy.
/// `Ok(None)` short-circuits to an empty result.
fn gather_sets(
    db: &Db,
    keys: &[String],
    missing_first: MissingKey,
    missing_rest: MissingKey,
) -> Result<Option<Vec<Set>>, Frame> {
    let mut sets = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        match load_set(db, key)? {
            Some(set) => sets.push(set),
            None => {
                let policy = if i == 0 { &missing_first } else { &missing_rest };
                match policy {
                    MissingKey::Skip => {}
                    MissingKey::EmptyResult => return Ok(None),
                }
            }
        }
    }
    Ok(Some(sets))
}

fn union_of(sets: &[Set]) -> Set {
    let mut iter = sets.iter();
    let Some(first) = iter.next() else {
        return Set::new();
    };
    iter.fold(first.clone(), |acc, s| acc.union(s))
}

fn intersection_of(sets: &[Set]) -> Set {
    let mut iter = sets.iter();
    let Some(first) = iter.next() else {
        return Set::new();
    };
    iter.fold(first.clone(), |acc, s| acc.intersect(s))
}

fn diff_of(sets: &[Set]) -> Set {
    let mut iter = sets.iter();
    let Some(first) = iter.next() else {
        return Set::new();
    };
    iter.fold(first.clone(), |acc, s| acc.diff(s))
}

/// SUNION key [key ...]
fn sunion(db: &Db, args: &[Bytes]) -> Frame {
    algebra_read(db, args, MissingKey::Skip, MissingKey::Skip, union_of)
}

/// SINTER key [key ...]
fn sinter(db: &Db, args: &[Bytes]) -> Frame {
    algebra_read(
        db,
        args,
        MissingKey::EmptyResult,
        MissingKey::EmptyResult,
        intersection_of,
    )
}

/// SDIFF key [key ...]
fn sdiff(db: &Db, args: &[Bytes]) -> Frame {
    algebra_read(db, args, MissingKey::EmptyResult, MissingKey::Skip, diff_of)
}

fn algebra_read(
    db: &Db,
    args: &[Bytes],
    missing_first: MissingKey,
    missing_rest: MissingKey,
    combine: fn(&[Set]) -> Set,
) -> Frame {
    let keys: Vec<String> = args.iter().map(arg_str).collect();
    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();

    db.locks.with_read_many(&refs, || {
        let sets = match gather_sets(db, &keys, missing_first, missing_rest) {
            Ok(Some(sets)) => sets,
            Ok(None) => return reply::empty_array(),
            Err(err) => return err,
        };
        if sets.is_empty() {
            return reply::empty_array();
        }
        let result = combine(&sets);
        reply::bulk_array(result.members().into_iter().map(Bytes::from))
    })
}

/// SUNIONSTORE destination key [key ...]
fn sunionstore(db: &Db, args: &[Bytes]) -> Frame {
    algebra_store(db, args, "SUNIONSTORE", MissingKey::Skip, MissingKey::Skip, union_of)
}

/// SINTERSTORE destination key [key ...]
fn sinterstore(db: &Db, args: &[Bytes]) -> Frame {
    algebra_store(
        db,
        args,
        "SINTERSTORE",
        MissingKey::EmptyResult,
        MissingKey::EmptyResult,
        intersection_of,
    )
}

/// SDIFFSTORE destination key [key ...]
fn sdiffstore(db: &Db, args: &[Bytes]) -> Frame {
    algebra_store(
        db,
        args,
        "SDIFFSTORE",
        MissingKey::EmptyResult,
        MissingKey::Skip,
        diff_of,
    )
}

/// An empty result removes the destination; otherwise the destination is
/// overwritten with the combined set.
fn algebra_store(
    db: &Db,
    args: &[Bytes],
    name: &'static str,
    missing_first: MissingKey,
    missing_rest: MissingKey,
    combine: fn(&[Set]) -> Set,
) -> Frame {
    let dest = arg_str(&args[0]);
    let src_keys: Vec<String> = args[1..].iter().map(arg_str).collect();

    let mut all_refs: Vec<&str> = Vec::with_capacity(src_keys.len() + 1);
    all_refs.push(&dest);
    all_refs.extend(src_keys.iter().map(String::as_str));

    db.locks.with_write_many(&all_refs, || {
        let result = match gather_sets(db, &src_keys, missing_first, missing_rest) {
            Ok(Some(sets)) if !sets.is_empty() => combine(&sets),
            Ok(_) => Set::new(),
            Err(err) => return err,
        };

        if result.is_empty() {
            db.remove_key(&dest);
            db.add_aof(&aof_line(name, args));
            return reply::integer(0);
        }

        let stored = result.len();
        db.data.put(dest.clone(), Entity::Set(result));
        db.add_aof(&aof_line(name, args));
        reply::integer(stored as i64)
    })
}

/// SSCAN key cursor [MATCH pattern] [COUNT count]
fn sscan(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let cursor = match parse_int(&args[1]) {
        Some(c) if c >= 0 => c as usize,
        _ => return reply::error("ERR invalid cursor"),
    };

    let mut pattern = String::from("*");
    let mut count = 10usize;
    let mut i = 2;
    while i < args.len() {
        let opt = arg_str(&args[i]).to_uppercase();
        match opt.as_str() {
            "MATCH" if i + 1 < args.len() => {
                pattern = arg_str(&args[i + 1]);
                i += 2;
            }
            "COUNT" if i + 1 < args.len() => {
                match parse_int(&args[i + 1]) {
                    Some(c) if c > 0 => count = c as usize,
                    _ => return reply::not_integer(),
                }
                i += 2;
            }
            _ => return reply::syntax_err(),
        }
    }

    db.locks.with_read(&key, || {
        let set = match load_set(db, &key) {
            Ok(Some(set)) => set,
            Ok(None) => return reply::scan(0, Vec::new()),
            Err(err) => return err,
        };

        let members = set.members();
        if cursor >= members.len() {
            return reply::scan(0, Vec::new());
        }

        let mut out: Vec<Bytes> = Vec::new();
        let mut matched = 0;
        let mut i = cursor;
        while i < members.len() && matched < count {
            if glob_match(&pattern, &members[i]) {
                out.push(Bytes::from(members[i].clone()));
                matched += 1;
            }
            i += 1;
        }

        let next_cursor = if i >= members.len() { 0 } else { i as i64 };
        reply::scan(next_cursor, out)
    })
}

/// SENCODING key — "listpack" while compact, "dict" once expanded.
fn sencoding(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || match db.data.get(&key) {
        Some(entry) => match &*entry {
            Entity::Set(set) => match set.encoding() {
                crate::types::Encoding::Compact => reply::bulk("listpack"),
                crate::types::Encoding::Expanded => reply::bulk("dict"),
            },
            _ => reply::wrong_type(),
        },
        None => reply::null(),
    })
}

pub(super) fn register(table: &mut Table) {
    insert(table, "sadd", sadd, -3);
    insert(table, "srem", srem, -3);
    insert(table, "sismember", sismember, 3);
    insert(table, "smembers", smembers, 2);
    insert(table, "scard", scard, 2);
    insert(table, "spop", spop, -2);
    insert(table, "srandmember", srandmember, -2);
    insert(table, "smove", smove, 4);
    insert(table, "sunion", sunion, -2);
    insert(table, "sinter", sinter, -2);
    insert(table, "sdiff", sdiff, -2);
    insert(table, "sunionstore", sunionstore, -3);
    insert(table, "sinterstore", sinterstore, -3);
    insert(table, "sdiffstore", sdiffstore, -3);
    insert(table, "sscan", sscan, -3);
    insert(table, "sencoding", sencoding, 2);
}
