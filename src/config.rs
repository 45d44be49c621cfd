//! Memory layout description.
//!
//! The layout is written in TOML, one array of tables per zone:
//!
//! ```toml
//! [[heap.fixed]]
//! size = "4K"
//! caps = "RAM | CACHE"
//!
//! [[heap.runtime]]
//! size = "10K"
//! caps = "RAM | CACHE | DMA"
//! pools = [
//!     { block = "16", capacity = 128 },
//!     { block = "128", capacity = 32 },
//!     { block = "1K", capacity = 4 },
//! ]
//! ```
//!
//! Sizes are strings with an optional `K` or `M` suffix, or hexadecimal with
//! a `0x` prefix. Fixed heaps have no pools. Every other heap must have
//! pools sorted by block size that fit into the heap. Fixed and startup
//! heaps are listed in core order.

use crate::heap::{Caps, Zone};
use serde::{Deserialize, Deserializer};

/// Errors of a layout description.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The document is not valid TOML or doesn't match the schema.
    #[error("invalid layout: {0}")]
    Toml(#[from] toml::de::Error),
    /// A fixed heap declares pools.
    #[error("{zone}[{index}] is a fixed heap and can't have pools")]
    UnexpectedPools {
        /// Zone of the heap.
        zone: Zone,
        /// Index of the heap.
        index: usize,
    },
    /// A block-mapped heap declares no pools.
    #[error("{zone}[{index}] has no pools")]
    MissingPools {
        /// Zone of the heap.
        zone: Zone,
        /// Index of the heap.
        index: usize,
    },
    /// A pool has zero-sized blocks or no blocks.
    #[error("{zone}[{index}] has an empty pool")]
    EmptyPool {
        /// Zone of the heap.
        zone: Zone,
        /// Index of the heap.
        index: usize,
    },
    /// Pools are not sorted by block size.
    #[error("pools of {zone}[{index}] are not sorted by block size")]
    UnsortedPools {
        /// Zone of the heap.
        zone: Zone,
        /// Index of the heap.
        index: usize,
    },
    /// Pools don't fit into the heap.
    #[error("pools of {zone}[{index}] need {required} bytes, but the heap has {size}")]
    Overflow {
        /// Zone of the heap.
        zone: Zone,
        /// Index of the heap.
        index: usize,
        /// Heap size.
        size: usize,
        /// Space the pools occupy.
        required: usize,
    },
    /// A per-core zone doesn't have one heap per core.
    #[error("{heaps} {zone} heaps declared for {cores} cores")]
    CoreMismatch {
        /// The per-core zone.
        zone: Zone,
        /// Number of fixed heaps, one per core.
        cores: usize,
        /// Number of heaps of the zone.
        heaps: usize,
    },
    /// Host memory for a heap couldn't be allocated.
    #[error("can't allocate {0} bytes of host memory")]
    HostMemory(usize),
}

/// The whole memory layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Layout {
    /// Heaps by zone.
    #[serde(default)]
    pub heap: Heaps,
}

/// Heaps by zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Heaps {
    /// Fixed heaps, one per core.
    #[serde(default)]
    pub fixed: Vec<HeapLayout>,
    /// Startup heaps, one per core.
    #[serde(default)]
    pub startup: Vec<HeapLayout>,
    /// Runtime heaps.
    #[serde(default)]
    pub runtime: Vec<HeapLayout>,
    /// Buffer heaps.
    #[serde(default)]
    pub buffer: Vec<HeapLayout>,
}

/// One heap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeapLayout {
    /// Heap size.
    #[serde(deserialize_with = "deserialize_size")]
    pub size: usize,
    /// Memory capabilities.
    pub caps: Caps,
    /// Block pools, by ascending block size.
    #[serde(default)]
    pub pools: Vec<PoolLayout>,
}

/// One size class of a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolLayout {
    /// Block size.
    #[serde(deserialize_with = "deserialize_size")]
    pub block: usize,
    /// Number of blocks.
    pub capacity: usize,
}

impl Layout {
    /// Parses and validates a layout.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let layout: Self = toml::from_str(content)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Returns the heaps of `zone`.
    pub fn heaps(&self, zone: Zone) -> &[HeapLayout] {
        match zone {
            Zone::Fixed => &self.heap.fixed,
            Zone::Startup => &self.heap.startup,
            Zone::Runtime => &self.heap.runtime,
            Zone::Buffer => &self.heap.buffer,
        }
    }

    /// Checks the layout for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cores = self.heap.fixed.len();
        for zone in Zone::ALL.into_iter().filter(|zone| zone.is_per_core()) {
            let heaps = self.heaps(zone).len();
            if heaps != 0 && heaps != cores {
                return Err(ConfigError::CoreMismatch { zone, cores, heaps });
            }
        }
        for zone in Zone::ALL {
            for (index, heap) in self.heaps(zone).iter().enumerate() {
                heap.validate(zone, index)?;
            }
        }
        Ok(())
    }
}

impl HeapLayout {
    /// Returns the number of bytes the pools occupy.
    pub fn pools_size(&self) -> usize {
        self.pools
            .iter()
            .map(|pool| pool.block.saturating_mul(pool.capacity))
            .fold(0, usize::saturating_add)
    }

    fn validate(&self, zone: Zone, index: usize) -> Result<(), ConfigError> {
        if zone == Zone::Fixed {
            if !self.pools.is_empty() {
                return Err(ConfigError::UnexpectedPools { zone, index });
            }
            return Ok(());
        }
        if self.pools.is_empty() {
            return Err(ConfigError::MissingPools { zone, index });
        }
        if self.pools.iter().any(|pool| pool.block == 0 || pool.capacity == 0) {
            return Err(ConfigError::EmptyPool { zone, index });
        }
        if self.pools.windows(2).any(|pair| pair[0].block > pair[1].block) {
            return Err(ConfigError::UnsortedPools { zone, index });
        }
        let required = self.pools_size();
        if required > self.size {
            return Err(ConfigError::Overflow { zone, index, size: self.size, required });
        }
        Ok(())
    }
}

/// Parses a size string like `"512"`, `"10K"`, `"2M"`, or `"0x400"`.
pub fn parse_size(input: &str) -> Option<usize> {
    let input = input.trim();
    if let Some(hex) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        return usize::from_str_radix(&hex.replace('_', ""), 16).ok();
    }
    let (digits, multiplier) = match input.as_bytes().last()? {
        b'K' | b'k' => (&input[..input.len() - 1], 1 << 10),
        b'M' | b'm' => (&input[..input.len() - 1], 1 << 20),
        _ => (input, 1),
    };
    digits.trim().replace('_', "").parse::<usize>().ok()?.checked_mul(multiplier)
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let input = String::deserialize(deserializer)?;
    parse_size(&input).ok_or_else(|| serde::de::Error::custom(format!("invalid size `{input}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(parse_size("512"), Some(512));
        assert_eq!(parse_size("10K"), Some(10240));
        assert_eq!(parse_size("2M"), Some(2 << 20));
        assert_eq!(parse_size("0x1_000"), Some(0x1000));
        assert_eq!(parse_size(" 4 "), Some(4));
        assert_eq!(parse_size("K"), None);
        assert_eq!(parse_size("ten"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn full_layout() {
        let layout = Layout::parse(
            r#"
            [[heap.fixed]]
            size = "1K"
            caps = "RAM | CACHE"

            [[heap.fixed]]
            size = "1K"
            caps = "RAM | CACHE"

            [[heap.startup]]
            size = "1K"
            caps = "RAM"
            pools = [{ block = "64", capacity = 16 }]

            [[heap.startup]]
            size = "1K"
            caps = "RAM"
            pools = [{ block = "64", capacity = 16 }]

            [[heap.runtime]]
            size = "0x800"
            caps = "RAM | DMA"
            pools = [
                { block = "16", capacity = 64 },
                { block = "256", capacity = 4 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(layout.heaps(Zone::Fixed).len(), 2);
        assert_eq!(layout.heaps(Zone::Fixed)[0].caps, Caps::RAM | Caps::CACHE);
        let runtime = &layout.heaps(Zone::Runtime)[0];
        assert_eq!(runtime.size, 0x800);
        assert_eq!(runtime.pools[1], PoolLayout { block: 256, capacity: 4 });
        assert_eq!(runtime.pools_size(), 0x800);
        assert!(layout.heaps(Zone::Buffer).is_empty());
    }

    #[test]
    fn rejects_bad_layouts() {
        let err = |toml: &str| Layout::parse(toml).unwrap_err().to_string();
        assert_eq!(
            err(r#"
                [[heap.runtime]]
                size = "64"
                caps = "RAM"
                pools = [{ block = "32", capacity = 4 }]
            "#),
            "pools of runtime[0] need 128 bytes, but the heap has 64"
        );
        assert_eq!(
            err(r#"
                [[heap.buffer]]
                size = "1K"
                caps = "RAM"
                pools = [{ block = "64", capacity = 1 }, { block = "32", capacity = 1 }]
            "#),
            "pools of buffer[0] are not sorted by block size"
        );
        assert_eq!(
            err(r#"
                [[heap.fixed]]
                size = "1K"
                caps = "RAM"
                pools = [{ block = "64", capacity = 1 }]
            "#),
            "fixed[0] is a fixed heap and can't have pools"
        );
        assert_eq!(
            err("[[heap.runtime]]\nsize = \"1K\"\ncaps = \"RAM\"\npools = []"),
            "runtime[0] has no pools"
        );
        assert_eq!(
            err(r#"
                [[heap.startup]]
                size = "1K"
                caps = "RAM"
                pools = [{ block = "64", capacity = 1 }]
            "#),
            "1 startup heaps declared for 0 cores"
        );
        let two_cores_one_startup = r#"
            [[heap.fixed]]
            size = "1K"
            caps = "RAM"

            [[heap.fixed]]
            size = "1K"
            caps = "RAM"

            [[heap.startup]]
            size = "1K"
            caps = "RAM"
            pools = [{ block = "64", capacity = 1 }]
        "#;
        assert!(matches!(
            Layout::parse(two_cores_one_startup),
            Err(ConfigError::CoreMismatch { zone: Zone::Startup, cores: 2, heaps: 1 })
        ));
        let bad_size = err("[[heap.runtime]]\nsize = \"lots\"\ncaps = \"RAM\"");
        assert!(bad_size.contains("invalid size `lots`"));
        let bad_caps = err("[[heap.runtime]]\nsize = \"1K\"\ncaps = \"RAM | FAST\"");
        assert!(bad_caps.starts_with("invalid layout"));
    }
}
