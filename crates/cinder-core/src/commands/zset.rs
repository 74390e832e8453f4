//! Sorted-set commands: ZADD, ZSCORE, ZCARD, ZRANGE, ZREM, ZCOUNT,
//! ZRANK, ZTYPE, ZRANGEBYSCORE, ZREMRANGEBYRANK, ZREMRANGEBYSCORE.

use bytes::Bytes;

use cinder_protocol::{reply, Frame};

use super::{aof_line, arg_str, insert, parse_float, parse_int, Table};
use crate::db::Db;
use crate::entity::Entity;
use crate::types::sorted_set::format_score;
use crate::types::SortedSet;

/// Runs `f` against the sorted set at `key`; absent keys yield `missing`.
fn with_zset<T>(
    db: &Db,
    key: &str,
    missing: T,
    f: impl FnOnce(&SortedSet) -> T,
) -> Result<T, Frame> {
    match db.data.get(key) {
        Some(entry) => match &*entry {
            Entity::SortedSet(zset) => Ok(f(zset)),
            _ => Err(reply::wrong_type()),
        },
        None => Ok(missing),
    }
}

/// Mutates the sorted set at `key`; `Ok(None)` means the key is absent.
fn with_zset_mut<T>(
    db: &Db,
    key: &str,
    f: impl FnOnce(&mut SortedSet) -> T,
) -> Result<Option<T>, Frame> {
    match db.data.get_mut(key) {
        Some(mut entry) => match &mut *entry {
            Entity::SortedSet(zset) => Ok(Some(f(zset))),
            _ => Err(reply::wrong_type()),
        },
        None => Ok(None),
    }
}

/// ZADD key score member [score member ...]
fn zadd(db: &Db, args: &[Bytes]) -> Frame {
    if args.len() % 2 == 0 {
        return reply::arg_num_err("zadd");
    }
    let key = arg_str(&args[0]);

    // validate every score before touching the keyspace
    let mut pairs = Vec::with_capacity(args[1..].len() / 2);
    for chunk in args[1..].chunks_exact(2) {
        let Some(score) = parse_float(&chunk[0]) else {
            return reply::not_float();
        };
        pairs.push((score, arg_str(&chunk[1])));
    }

    db.locks.with_write(&key, || {
        let added = {
            let Some(mut entry) = db
                .data
                .get_or_insert_with(&key, || Entity::SortedSet(SortedSet::new()))
            else {
                return reply::integer(0);
            };
            match &mut *entry {
                Entity::SortedSet(zset) => {
                    let mut added = 0;
                    for (score, member) in &pairs {
                        if zset.add(member, *score) {
                            added += 1;
                        }
                    }
                    added
                }
                _ => return reply::wrong_type(),
            }
        };
        db.add_aof(&aof_line("ZADD", args));
        reply::integer(added)
    })
}

/// ZSCORE key member
fn zscore(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let member = arg_str(&args[1]);
    db.locks.with_read(&key, || {
        match with_zset(db, &key, None, |zset| zset.score(&member)) {
            Ok(Some(score)) => reply::bulk(format_score(score)),
            Ok(None) => reply::null(),
            Err(err) => err,
        }
    })
}

/// ZCARD key
fn zcard(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || {
        match with_zset(db, &key, 0, |zset| zset.len()) {
            Ok(len) => reply::integer(len as i64),
            Err(err) => err,
        }
    })
}

/// ZRANGE key start stop [WITHSCORES]
fn zrange(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let Some(start) = parse_int(&args[1]) else {
        return reply::not_integer();
    };
    let Some(stop) = parse_int(&args[2]) else {
        return reply::not_integer();
    };
    let with_scores = match args.get(3) {
        Some(flag) if arg_str(flag).eq_ignore_ascii_case("WITHSCORES") => true,
        Some(_) => return reply::syntax_err(),
        None => false,
    };
    if args.len() > 4 {
        return reply::syntax_err();
    }

    db.locks.with_read(&key, || {
        let listing = with_zset(db, &key, Vec::new(), |zset| {
            let members = zset.range_by_rank(start, stop);
            members
                .into_iter()
                .map(|m| {
                    let score = zset.score(&m);
                    (m, score)
                })
                .collect::<Vec<_>>()
        });
        match listing {
            Ok(members) => render_members(members, with_scores),
            Err(err) => err,
        }
    })
}

/// ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]
fn zrangebyscore(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let Some(min) = parse_float(&args[1]) else {
        return reply::not_float();
    };
    let Some(max) = parse_float(&args[2]) else {
        return reply::not_float();
    };

    let mut with_scores = false;
    let mut offset = 0i64;
    let mut count = -1i64;
    let mut i = 3;
    while i < args.len() {
        let opt = arg_str(&args[i]).to_uppercase();
        match opt.as_str() {
            "WITHSCORES" => {
                with_scores = true;
                i += 1;
            }
            "LIMIT" if i + 2 < args.len() => {
                let (Some(o), Some(c)) = (parse_int(&args[i + 1]), parse_int(&args[i + 2]))
                else {
                    return reply::not_integer();
                };
                offset = o;
                count = c;
                i += 3;
            }
            _ => return reply::syntax_err(),
        }
    }

    db.locks.with_read(&key, || {
        let listing = with_zset(db, &key, Vec::new(), |zset| {
            zset.range_by_score(min, max, offset, count)
                .into_iter()
                .map(|m| {
                    let score = zset.score(&m);
                    (m, score)
                })
                .collect::<Vec<_>>()
        });
        match listing {
            Ok(members) => render_members(members, with_scores),
            Err(err) => err,
        }
    })
}

fn render_members(members: Vec<(String, Option<f64>)>, with_scores: bool) -> Frame {
    if !with_scores {
        return reply::bulk_array(members.into_iter().map(|(m, _)| Bytes::from(m)));
    }
    let mut flat: Vec<Bytes> = Vec::with_capacity(members.len() * 2);
    for (member, score) in members {
        flat.push(Bytes::from(member));
        flat.push(Bytes::from(format_score(score.unwrap_or_default())));
    }
    reply::bulk_array(flat)
}

/// ZREM key member [member ...]
fn zrem(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_write(&key, || {
        let removed = match with_zset_mut(db, &key, |zset| {
            let mut removed = 0;
            for member in &args[1..] {
                if zset.remove(&arg_str(member)) {
                    removed += 1;
                }
            }
            removed
        }) {
            Ok(Some(removed)) => removed,
            Ok(None) => return reply::integer(0),
            Err(err) => return err,
        };
        if removed > 0 {
            db.add_aof(&aof_line("ZREM", args));
        }
        reply::integer(removed)
    })
}

/// ZCOUNT key min max
fn zcount(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let Some(min) = parse_float(&args[1]) else {
        return reply::not_float();
    };
    let Some(max) = parse_float(&args[2]) else {
        return reply::not_float();
    };
    db.locks.with_read(&key, || {
        match with_zset(db, &key, 0, |zset| zset.count(min, max)) {
            Ok(count) => reply::integer(count as i64),
            Err(err) => err,
        }
    })
}

/// ZRANK key member — 0-based ascending rank.
fn zrank(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let member = arg_str(&args[1]);
    db.locks.with_read(&key, || {
        match with_zset(db, &key, None, |zset| zset.rank(&member)) {
            Ok(Some(rank)) => reply::integer(rank as i64),
            Ok(None) => reply::null(),
            Err(err) => err,
        }
    })
}

/// ZTYPE key — 0 while compact, 1 once skip-list backed.
fn ztype(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    db.locks.with_read(&key, || match db.data.get(&key) {
        Some(entry) => match &*entry {
            Entity::SortedSet(zset) => reply::integer(zset.encoding().code()),
            _ => reply::wrong_type(),
        },
        None => reply::null(),
    })
}

/// ZREMRANGEBYRANK key start stop
fn zremrangebyrank(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let Some(start) = parse_int(&args[1]) else {
        return reply::not_integer();
    };
    let Some(stop) = parse_int(&args[2]) else {
        return reply::not_integer();
    };
    db.locks.with_write(&key, || {
        let removed = match with_zset_mut(db, &key, |zset| zset.remove_range_by_rank(start, stop))
        {
            Ok(Some(removed)) => removed,
            Ok(None) => return reply::integer(0),
            Err(err) => return err,
        };
        if removed > 0 {
            db.add_aof(&aof_line("ZREMRANGEBYRANK", args));
        }
        reply::integer(removed as i64)
    })
}

/// ZREMRANGEBYSCORE key min max
fn zremrangebyscore(db: &Db, args: &[Bytes]) -> Frame {
    let key = arg_str(&args[0]);
    let Some(min) = parse_float(&args[1]) else {
        return reply::not_float();
    };
    let Some(max) = parse_float(&args[2]) else {
        return reply::not_float();
    };
    db.locks.with_write(&key, || {
        let removed = match with_zset_mut(db, &key, |zset| zset.remove_range_by_score(min, max)) {
            Ok(Some(removed)) => removed,
            Ok(None) => return reply::integer(0),
            Err(err) => return err,
        };
        if removed > 0 {
            db.add_aof(&aof_line("ZREMRANGEBYSCORE", args));
        }
        reply::integer(removed as i64)
    })
}

pub(super) fn register(table: &mut Table) {
    insert(table, "zadd", zadd, -4);
    insert(table, "zscore", zscore, 3);
    insert(table, "zcard", zcard, 2);
    insert(table, "zrange", zrange, -4);
    insert(table, "zrem", zrem, -3);
    insert(table, "zcount", zcount, 4);
    insert(table, "zrank", zrank, 3);
    insert(table, "ztype", ztype, 2);
    insert(table, "zremrangebyrank", zremrangebyrank, 4);
    insert(table, "zremrangebyscore", zremrangebyscore, 4);
    insert(table, "zrangebyscore", zrangebyscore, -4);
}
