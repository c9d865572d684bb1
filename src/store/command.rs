// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The command table: parses arguments, calls into a `Shard`, and shapes
//! the reply. One function per command family member; dispatch is a single
//! `match` on the upper-cased command name.

use crate::error::KvError;
use crate::resp::encode::format_score;
use crate::resp::Reply;
use crate::store::shard::Shard;

/// `KEYS` is the one command a worker cannot answer from its own shard
/// alone; the reactor recognises this name and broadcasts it to every
/// shard, merging replies before writing back to the client.
pub const BROADCAST_COMMANDS: &[&str] = &["KEYS"];

fn err_reply(e: KvError) -> Reply {
    Reply::Error(e.to_string())
}

fn wrong_arity(command: &str) -> Reply {
    err_reply(KvError::WrongArity { command: command.to_string() })
}

fn parse_i64(s: &str) -> Result<i64, Reply> {
    s.parse::<i64>().map_err(|_| err_reply(KvError::NotAnInteger))
}

fn parse_u32(s: &str) -> Result<u32, Reply> {
    s.parse::<u32>().map_err(|_| err_reply(KvError::NotAnInteger))
}

fn parse_f64(s: &str) -> Result<f64, Reply> {
    s.parse::<f64>().map_err(|_| err_reply(KvError::SyntaxError))
}

/// Executes one already-parsed command against `shard`, returning the
/// reply to send back on the wire. `KEYS` is handled by the caller via
/// [`BROADCAST_COMMANDS`] and never reaches this function.
pub fn execute(shard: &mut Shard, name: &str, args: &[String]) -> Reply {
    let upper = name.to_uppercase();
    match upper.as_str() {
        "PING" => cmd_ping(args),
        "SET" => cmd_set(shard, args),
        "GET" => cmd_get(shard, args),
        "TTL" => cmd_ttl(shard, args),
        "PTTL" => cmd_pttl(shard, args),
        "EXPIRE" => cmd_expire(shard, args),
        "PEXPIRE" => cmd_pexpire(shard, args),
        "PERSIST" => cmd_persist(shard, args),
        "EXISTS" => cmd_exists(shard, args),
        "DEL" => cmd_del(shard, args),
        "SADD" => cmd_sadd(shard, args),
        "SMEMBERS" => cmd_smembers(shard, args),
        "SISMEMBER" => cmd_sismember(shard, args),
        "SMISMEMBER" => cmd_smismember(shard, args),
        "ZADD" => cmd_zadd(shard, args),
        "ZSCORE" => cmd_zscore(shard, args),
        "ZRANK" => cmd_zrank(shard, args),
        "ZCARD" => cmd_zcard(shard, args),
        "ZRANGE" => cmd_zrange(shard, args),
        "ZREM" => cmd_zrem(shard, args),
        "CMS.INITBYDIM" => cmd_cms_initbydim(shard, args),
        "CMS.INITBYPROB" => cmd_cms_initbyprob(shard, args),
        "CMS.INCRBY" => cmd_cms_incrby(shard, args),
        "CMS.QUERY" => cmd_cms_query(shard, args),
        "CMS.INFO" => cmd_cms_info(shard, args),
        _ => err_reply(KvError::UnknownCommand),
    }
}

fn cmd_ping(args: &[String]) -> Reply {
    match args.len() {
        0 => Reply::Simple("PONG".to_string()),
        1 => Reply::bulk(args[0].clone()),
        _ => wrong_arity("PING"),
    }
}

fn cmd_set(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() == 3 || args.len() > 4 {
        return err_reply(KvError::SyntaxError);
    }
    if args.len() < 2 {
        return wrong_arity("SET");
    }
    let (key, value) = (&args[0], &args[1]);
    let ttl = if args.len() == 4 {
        let opt = args[2].to_uppercase();
        let amount = match parse_i64(&args[3]) {
            Ok(v) if v > 0 => v as u64,
            Ok(_) => return err_reply(KvError::SyntaxError),
            Err(reply) => return reply,
        };
        match opt.as_str() {
            "EX" => Some(std::time::Duration::from_secs(amount)),
            "PX" => Some(std::time::Duration::from_millis(amount)),
            _ => return err_reply(KvError::SyntaxError),
        }
    } else {
        None
    };
    shard.set(key, value, ttl);
    Reply::ok()
}

fn cmd_get(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 1 {
        return wrong_arity("GET");
    }
    match shard.get(&args[0]) {
        Ok(Some(value)) => Reply::bulk(value),
        Ok(None) => Reply::NilBulk,
        Err(e) => err_reply(e),
    }
}

fn cmd_ttl(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 1 {
        return wrong_arity("TTL");
    }
    Reply::Integer(shard.ttl_seconds(&args[0]))
}

fn cmd_pttl(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 1 {
        return wrong_arity("PTTL");
    }
    Reply::Integer(shard.pttl_millis(&args[0]))
}

fn cmd_expire(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() > 2 {
        return err_reply(KvError::SyntaxError);
    }
    if args.len() < 2 {
        return wrong_arity("EXPIRE");
    }
    let seconds = match parse_i64(&args[1]) {
        Ok(v) => v,
        Err(reply) => return reply,
    };
    Reply::Integer(shard.expire(&args[0], seconds) as i64)
}

fn cmd_pexpire(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() > 2 {
        return err_reply(KvError::SyntaxError);
    }
    if args.len() < 2 {
        return wrong_arity("PEXPIRE");
    }
    let millis = match parse_i64(&args[1]) {
        Ok(v) => v,
        Err(reply) => return reply,
    };
    Reply::Integer(shard.pexpire(&args[0], millis) as i64)
}

fn cmd_persist(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 1 {
        return wrong_arity("PERSIST");
    }
    Reply::Integer(shard.persist(&args[0]) as i64)
}

fn cmd_exists(shard: &mut Shard, args: &[String]) -> Reply {
    if args.is_empty() {
        return wrong_arity("EXISTS");
    }
    Reply::Integer(shard.exists(args) as i64)
}

fn cmd_del(shard: &mut Shard, args: &[String]) -> Reply {
    if args.is_empty() {
        return wrong_arity("DEL");
    }
    Reply::Integer(shard.del(args) as i64)
}

fn cmd_sadd(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() < 2 {
        return wrong_arity("SADD");
    }
    match shard.sadd(&args[0], &args[1..]) {
        Ok(added) => Reply::Integer(added as i64),
        Err(e) => err_reply(e),
    }
}

fn cmd_smembers(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 1 {
        return wrong_arity("SMEMBERS");
    }
    match shard.smembers(&args[0]) {
        Ok(members) => Reply::array_of_strings(members),
        Err(e) => err_reply(e),
    }
}

fn cmd_sismember(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 2 {
        return wrong_arity("SISMEMBER");
    }
    match shard.sismember(&args[0], &args[1]) {
        Ok(is_member) => Reply::Integer(is_member as i64),
        Err(e) => err_reply(e),
    }
}

fn cmd_smismember(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() < 2 {
        return wrong_arity("SMISMEMBER");
    }
    match shard.smismember(&args[0], &args[1..]) {
        Ok(flags) => Reply::Array(flags.into_iter().map(|f| Reply::Integer(f as i64)).collect()),
        Err(e) => err_reply(e),
    }
}

fn cmd_zadd(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() < 3 || (args.len() - 1) % 2 != 0 {
        return wrong_arity("ZADD");
    }
    let key = &args[0];
    let mut added = 0i64;
    let mut pairs = args[1..].chunks_exact(2);
    for pair in &mut pairs {
        let score = match parse_f64(&pair[0]) {
            Ok(v) => v,
            Err(reply) => return reply,
        };
        match shard.zadd(key, score, &pair[1]) {
            Ok(true) => added += 1,
            Ok(false) => {}
            Err(e) => return err_reply(e),
        }
    }
    Reply::Integer(added)
}

fn cmd_zscore(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 2 {
        return wrong_arity("ZSCORE");
    }
    match shard.zscore(&args[0], &args[1]) {
        Ok(Some(score)) => Reply::bulk(format_score(score)),
        Ok(None) => Reply::NilBulk,
        Err(e) => err_reply(e),
    }
}

fn cmd_zrank(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 2 {
        return wrong_arity("ZRANK");
    }
    match shard.zrank(&args[0], &args[1]) {
        Ok(Some(rank)) => Reply::Integer(rank as i64),
        Ok(None) => Reply::NilBulk,
        Err(e) => err_reply(e),
    }
}

fn cmd_zcard(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 1 {
        return wrong_arity("ZCARD");
    }
    match shard.zcard(&args[0]) {
        Ok(n) => Reply::Integer(n as i64),
        Err(e) => err_reply(e),
    }
}

fn cmd_zrange(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() < 3 || args.len() > 4 {
        return wrong_arity("ZRANGE");
    }
    let start = match parse_i64(&args[1]) {
        Ok(v) => v,
        Err(reply) => return reply,
    };
    let stop = match parse_i64(&args[2]) {
        Ok(v) => v,
        Err(reply) => return reply,
    };
    let with_scores = match args.get(3) {
        None => false,
        Some(flag) if flag.eq_ignore_ascii_case("WITHSCORES") => true,
        Some(_) => return err_reply(KvError::SyntaxError),
    };

    if with_scores {
        match shard.zrange_with_score(&args[0], start, stop) {
            Ok(pairs) => {
                let mut items = Vec::with_capacity(pairs.len() * 2);
                for (member, score) in pairs {
                    items.push(Reply::bulk(member));
                    items.push(Reply::bulk(format_score(score)));
                }
                Reply::Array(items)
            }
            Err(e) => err_reply(e),
        }
    } else {
        match shard.zrange(&args[0], start, stop) {
            Ok(members) => Reply::array_of_strings(members),
            Err(e) => err_reply(e),
        }
    }
}

fn cmd_zrem(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() < 2 {
        return wrong_arity("ZREM");
    }
    match shard.zrem(&args[0], &args[1..]) {
        Ok(removed) => Reply::Integer(removed as i64),
        Err(e) => err_reply(e),
    }
}

fn cmd_cms_initbydim(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 3 {
        return wrong_arity("CMS.INITBYDIM");
    }
    let width = match parse_u32(&args[1]) {
        Ok(v) => v,
        Err(reply) => return reply,
    };
    let depth = match parse_u32(&args[2]) {
        Ok(v) => v,
        Err(reply) => return reply,
    };
    match shard.cms_init_by_dim(&args[0], width, depth) {
        Ok(true) => Reply::ok(),
        Ok(false) => err_reply(KvError::SyntaxError),
        Err(e) => err_reply(e),
    }
}

fn cmd_cms_initbyprob(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 3 {
        return wrong_arity("CMS.INITBYPROB");
    }
    let error_rate = match parse_f64(&args[1]) {
        Ok(v) => v,
        Err(reply) => return reply,
    };
    let error_prob = match parse_f64(&args[2]) {
        Ok(v) => v,
        Err(reply) => return reply,
    };
    match shard.cms_init_by_prob(&args[0], error_rate, error_prob) {
        Ok(true) => Reply::ok(),
        Ok(false) => err_reply(KvError::SyntaxError),
        Err(e) => err_reply(e),
    }
}

fn cmd_cms_incrby(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() < 3 || args.len() % 2 == 0 {
        return wrong_arity("CMS.INCRBY");
    }
    let key = &args[0];
    let mut results = Vec::new();
    let mut pairs = args[1..].chunks_exact(2);
    for pair in &mut pairs {
        let value = match parse_u32(&pair[1]) {
            Ok(v) => v,
            Err(reply) => return reply,
        };
        match shard.cms_incrby(key, &pair[0], value) {
            Ok(count) if count == u32::MAX => {
                results.push(Reply::bulk(KvError::CmsOverflow.to_string()))
            }
            Ok(count) => results.push(Reply::Integer(count as i64)),
            Err(e) => return err_reply(e),
        }
    }
    Reply::Array(results)
}

fn cmd_cms_query(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() < 2 {
        return wrong_arity("CMS.QUERY");
    }
    match shard.cms_query(&args[0], &args[1..]) {
        Ok(counts) => Reply::Array(counts.into_iter().map(|c| Reply::Integer(c as i64)).collect()),
        Err(e) => err_reply(e),
    }
}

fn cmd_cms_info(shard: &mut Shard, args: &[String]) -> Reply {
    if args.len() != 1 {
        return wrong_arity("CMS.INFO");
    }
    match shard.cms_info(&args[0]) {
        Ok((width, depth)) => Reply::Array(vec![
            Reply::bulk("width"),
            Reply::Integer(width as i64),
            Reply::bulk("depth"),
            Reply::Integer(depth as i64),
        ]),
        Err(e) => err_reply(e),
    }
}

/// Implements the `KEYS *` broadcast reply directly (no shard needed): the
/// caller merges each shard's `Shard::keys()` output and calls this to
/// shape the final array, rejecting any pattern other than the literal `*`.
pub fn keys_pattern_reply(pattern: &str, merged_keys: Vec<String>) -> Reply {
    if pattern != "*" {
        return err_reply(KvError::SyntaxError);
    }
    Reply::array_of_strings(merged_keys)
}
