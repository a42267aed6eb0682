//! `nqueue`: the sliding window exposed to scripts as userdata

use logias_core::SlidingWindow;
use mlua::{Lua, MetaMethod, UserData, UserDataMethods};

/// Userdata wrapper around a [`SlidingWindow`]
#[derive(Debug, Clone)]
pub struct NQueue(SlidingWindow);

impl NQueue {
    pub fn new(window: SlidingWindow) -> Self {
        Self(window)
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.0
    }

    pub fn window_mut(&mut self) -> &mut SlidingWindow {
        &mut self.0
    }
}

impl UserData for NQueue {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method_mut("put", |_, this, value: f64| {
            this.0.put(value);
            Ok(())
        });
        methods.add_method("at", |_, this, index: i64| Ok(this.0.at(index)));
        methods.add_method_mut("pop", |_, this, ()| Ok(this.0.pop()));
        methods.add_method("max", |_, this, ()| Ok(this.0.max()));
        methods.add_method("min", |_, this, ()| Ok(this.0.min()));
        methods.add_method("capacity", |_, this, ()| Ok(this.0.capacity()));
        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.0.len()));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            let samples: Vec<String> = this.0.iter().map(|v| v.to_string()).collect();
            Ok(format!("nqueue[{}]", samples.join(", ")))
        });
    }
}

/// Build the `nqueue` global table
pub fn register(lua: &Lua) -> mlua::Result<()> {
    let nqueue = lua.create_table()?;
    nqueue.set(
        "new",
        lua.create_function(|lua, capacity: Option<usize>| {
            lua.create_userdata(NQueue::new(SlidingWindow::new(
                capacity.unwrap_or(logias_core::DEFAULT_WINDOW_CAPACITY),
            )))
        })?,
    )?;
    lua.globals().set("nqueue", nqueue)
}
