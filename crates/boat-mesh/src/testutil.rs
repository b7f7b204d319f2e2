use boat_proto::{Fix, FixSource};
use std::collections::VecDeque;

use crate::radio::{Path, Radio};

#[derive(Debug, Default)]
pub struct RecordingRadio {
    pub mesh: Vec<Vec<u8>>,
    pub wan: Vec<Vec<u8>>,
    pub inbox: VecDeque<Vec<u8>>,
    pub joined: bool,
    pub mesh_busy: bool,
    pub wan_busy: bool,
}

impl Radio for RecordingRadio {
    fn try_transmit(&mut self, path: Path, frame: &[u8]) -> bool {
        match path {
            Path::Mesh if self.mesh_busy => false,
            Path::Mesh => {
                self.mesh.push(frame.to_vec());
                true
            }
            Path::WideArea if self.wan_busy || !self.joined => false,
            Path::WideArea => {
                self.wan.push(frame.to_vec());
                true
            }
        }
    }

    fn poll_receive(&mut self) -> Option<Vec<u8>> {
        self.inbox.pop_front()
    }

    fn is_wide_area_joined(&self) -> bool {
        self.joined
    }
}

pub struct StaticFix(pub Fix, pub u8);

impl FixSource for StaticFix {
    fn current_fix(&self) -> Fix {
        self.0
    }

    fn battery_percent(&self) -> u8 {
        self.1
    }
}
