//! Constants and stage constructors defined before the configuration runs

use mlua::Lua;

/// Stage constructors return tagged tables that the loader resolves into
/// filters. `match{"x"}`, `match("x")` and `match{pattern = "x"}` are
/// equivalent; the same holds for `fn` of `test` and `action`, which also
/// accept their own name as key (`test{test = f}`).
pub const PRELUDE: &str = r#"
target = { FILE = "FILE", CMD = "CMD", SCRIPT = "SCRIPT", LUA = "SCRIPT" }

loglevel = { DEBUG = "DEBUG", INFO = "INFO", WARN = "WARN", ERROR = "ERROR", CRIT = "CRIT" }

local function stage(kind, field, alias)
  return function(args)
    if type(args) ~= "table" then
      args = { args }
    end
    local s = { __filter = kind }
    if field then
      s[field] = args[field] or (alias and args[alias]) or args[1]
    else
      for k, v in pairs(args) do
        s[k] = v
      end
    end
    return s
  end
end

match = stage("match", "pattern")
notmatch = stage("notmatch", "pattern")
test = stage("test", "fn", "test")
action = stage("action", "fn", "action")
notify = stage("notify", nil)
"#;

/// Tag of a stage table
pub const STAGE_TAG: &str = "__filter";

pub fn install(lua: &Lua) -> mlua::Result<()> {
    lua.load(PRELUDE).set_name("=prelude").exec()
}
