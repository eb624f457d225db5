use crate::prelude::*;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// just needs to be bigger than the highest input register we store
const REGISTER_COUNT: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Namespace {
    Holding,
    Input,
    BufferedInput,
}

/// The register table proper. `Input` and `BufferedInput` hold telemetry
/// words; `Holding` keeps configuration values by config id. Cloning it
/// is how readers get a consistent snapshot.
#[derive(Clone, Debug)]
pub struct Registers {
    input: [u16; REGISTER_COUNT],
    buffered_input: [u16; REGISTER_COUNT],
    holding: HashMap<u16, Vec<u8>>,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            input: [0; REGISTER_COUNT],
            buffered_input: [0; REGISTER_COUNT],
            holding: HashMap::new(),
        }
    }
}

impl Registers {
    pub fn set(&mut self, namespace: Namespace, register: u16, values: &[u16]) {
        let table = match namespace {
            Namespace::Input => &mut self.input,
            Namespace::BufferedInput => &mut self.buffered_input,
            Namespace::Holding => {
                warn!("holding registers are set by config id, not by word");
                return;
            }
        };

        for (i, value) in values.iter().enumerate() {
            let address = register as usize + i;
            if address >= REGISTER_COUNT {
                warn!("register {} out of range, dropping write", address);
                return;
            }
            table[address] = *value;
        }
    }

    pub fn get(&self, namespace: Namespace, register: u16, count: u16) -> Vec<u16> {
        let table = match namespace {
            Namespace::Input => &self.input,
            Namespace::BufferedInput => &self.buffered_input,
            Namespace::Holding => return Vec::new(),
        };

        (register..register + count)
            .map(|address| {
                table
                    .get(address as usize)
                    .copied()
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Read two words as one 32-bit value, high word first.
    pub fn u32_value(&self, namespace: Namespace, register: u16) -> u32 {
        let words = self.get(namespace, register, 2);
        (u32::from(words[0]) << 16) | u32::from(words[1])
    }

    pub fn set_config(&mut self, config_id: u16, value: &[u8]) {
        self.holding.insert(config_id, value.to_vec());
    }

    pub fn config(&self, config_id: u16) -> Option<&Vec<u8>> {
        self.holding.get(&config_id)
    }

    /// The never-set sentinel is zero: a missing, empty or all-zero value
    /// counts as unset.
    pub fn config_is_set(&self, config_id: u16) -> bool {
        match self.holding.get(&config_id) {
            Some(value) => value.iter().any(|b| *b != 0),
            None => false,
        }
    }
}

/// Shared store; one exclusive writer at a time, snapshot reads.
#[derive(Clone, Default)]
pub struct RegisterCache {
    registers: Arc<Mutex<Registers>>,
}

impl RegisterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Registers),
    {
        f(&mut self.registers.lock().unwrap());
    }

    pub fn set_config(&self, config_id: u16, value: &[u8]) {
        self.registers.lock().unwrap().set_config(config_id, value);
    }

    pub fn snapshot(&self) -> Registers {
        self.registers.lock().unwrap().clone()
    }
}
