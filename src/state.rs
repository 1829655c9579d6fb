// state.rs

use crate::*;

pub struct MyState {
    pub config: RwLock<MyConfig>,
    // mirrored from wifi events so sync code can check the link without awaiting
    pub wifi_up: AtomicBool,
}

impl MyState {
    pub fn new(config: MyConfig) -> Self {
        MyState {
            config: RwLock::new(config),
            wifi_up: AtomicBool::new(false),
        }
    }

    pub fn link_up(&self) -> bool {
        self.wifi_up.load(Ordering::Relaxed)
    }

    pub fn set_link_up(&self, up: bool) {
        self.wifi_up.store(up, Ordering::Relaxed);
    }
}
// EOF
