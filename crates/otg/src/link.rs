//! USB device controller link state

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SYSFS_UDC: &str = "/sys/class/udc";

/// Whether the gadget link is up and able to move data
pub trait GadgetLink: Send {
    fn can_operate(&self) -> bool;
}

impl<L: GadgetLink + ?Sized> GadgetLink for Box<L> {
    fn can_operate(&self) -> bool {
        (**self).can_operate()
    }
}

/// For noop devices: there is no link to ask
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOperable;

impl GadgetLink for AlwaysOperable {
    fn can_operate(&self) -> bool {
        true
    }
}

/// UDC state read from sysfs
#[derive(Debug, Clone)]
pub struct Udc {
    state_path: Option<PathBuf>,
}

impl Udc {
    /// `name` empty or `None` picks the first controller found
    pub fn new(name: Option<&str>) -> Self {
        Self::with_root(SYSFS_UDC, name)
    }

    pub fn with_root(root: impl AsRef<Path>, name: Option<&str>) -> Self {
        let root = root.as_ref();
        let name = match name.filter(|n| !n.is_empty()) {
            Some(name) => Some(name.to_string()),
            None => Self::find_first(root),
        };
        let state_path = name.map(|n| root.join(n).join("state"));
        match &state_path {
            Some(path) => debug!("Using UDC state at {}", path.display()),
            None => debug!("No UDC found under {}", root.display()),
        }
        Self { state_path }
    }

    fn find_first(root: &Path) -> Option<String> {
        let mut names: Vec<String> = fs::read_dir(root)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names.into_iter().next()
    }
}

impl GadgetLink for Udc {
    fn can_operate(&self) -> bool {
        let Some(path) = &self.state_path else {
            return true;
        };
        match fs::read_to_string(path) {
            Ok(state) => state.trim() == "configured",
            // Unknown: let device I/O decide
            Err(_) => true,
        }
    }
}
