pub const SET_IF_NEWER: &str = r#"
-- KEYS[1]=entry key
-- ARGV: version (canonical decimal), data, ttl_secs
-- versions are canonical decimals (no sign, no leading zeros). the longer
-- one is larger, equal lengths compare lexicographically. exact for any u64.
local cur = redis.call('HGET', KEYS[1], 'version')
local new = ARGV[1]
if new ~= '0' and not string.match(new, '^[1-9]%d*$') then
  return redis.error_reply('BADVERSION version must be a canonical decimal integer')
end
if cur then
  if #new < #cur then return 'OK' end
  if #new == #cur and new <= cur then return 'OK' end
end
redis.call('HSET', KEYS[1], 'version', new, 'data', ARGV[2])
redis.call('HDEL', KEYS[1], 'leasing')
redis.call('EXPIRE', KEYS[1], ARGV[3])
return 'OK'
"#;

pub const GET_OR_LEASE: &str = r#"
-- KEYS[1]=entry key
-- ARGV: lease_ttl_secs
local data = redis.call('HGET', KEYS[1], 'data')
if data then return data end
if redis.call('HEXISTS', KEYS[1], 'leasing') == 1 then
  return redis.error_reply('LEASING cache entry is being leased')
end
redis.call('HSET', KEYS[1], 'leasing', '1')
redis.call('EXPIRE', KEYS[1], ARGV[1])
return false
"#;

/// Error code the lease script replies with while a lease is outstanding.
pub const LEASING_CODE: &str = "LEASING";
