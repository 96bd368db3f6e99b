// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! HDL data datagram parsing.
//!
//! # Datagram Structure (1206 bytes, little-endian)
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ 12 × firing block (100 bytes each)           │
//! │   block id      u16  0xEEFF lasers 0-31      │
//! │                      0xDDFF lasers 32-63     │
//! │   azimuth       u16  hundredths of a degree  │
//! │   32 × return   u16 distance (2mm) + u8 int. │
//! ├──────────────────────────────────────────────┤
//! │ timestamp       u32  µs since top of hour    │
//! │ reserved        2 bytes                      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Fields are read at fixed offsets from the borrowed byte slice; nothing is
//! copied.

use crate::lidar::{
    DATAGRAM_SIZE, Error, FIRINGS_PER_PACKET, LASERS_PER_FIRING, NUM_ROT_ANGLES,
};

/// Block marker for lasers 0-31.
pub const BLOCK_0_TO_31: u16 = 0xeeff;

/// Block marker for lasers 32-63.
pub const BLOCK_32_TO_63: u16 = 0xddff;

/// Size of a firing block in bytes.
pub const FIRING_BLOCK_SIZE: usize = 4 + LASERS_PER_FIRING * LASER_RETURN_SIZE;

/// Size of a laser return in bytes.
const LASER_RETURN_SIZE: usize = 3;

/// Offset of the hardware timestamp.
const TIMESTAMP_OFFSET: usize = FIRINGS_PER_PACKET * FIRING_BLOCK_SIZE;

/// Which half of the laser array a firing block belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockId {
    /// Lasers 0-31
    Upper,
    /// Lasers 32-63
    Lower,
}

impl BlockId {
    /// Laser id of the first return in the block.
    pub fn laser_offset(&self) -> u8 {
        match self {
            BlockId::Upper => 0,
            BlockId::Lower => LASERS_PER_FIRING as u8,
        }
    }
}

impl TryFrom<u16> for BlockId {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            BLOCK_0_TO_31 => Ok(BlockId::Upper),
            BLOCK_32_TO_63 => Ok(BlockId::Lower),
            other => Err(Error::UnknownBlockId(other)),
        }
    }
}

/// A single laser return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaserReturn {
    /// Laser id (local index + block offset)
    pub laser_id: u8,
    /// Raw distance, 2mm per unit; 0 means no return
    pub distance: u16,
    /// Reflectivity
    pub intensity: u8,
}

impl LaserReturn {
    /// Whether the laser received an echo.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.distance != 0
    }
}

/// Zero-copy view of a full HDL data datagram.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DataPacketSlice<'a> {
    slice: &'a [u8],
}

impl<'a> DataPacketSlice<'a> {
    /// Validate the datagram length and wrap it.
    pub fn from_slice(slice: &'a [u8]) -> Result<DataPacketSlice<'a>, Error> {
        if slice.len() != DATAGRAM_SIZE {
            return Err(Error::InvalidLength(slice.len()));
        }
        Ok(DataPacketSlice { slice })
    }

    /// The underlying datagram bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.slice
    }

    /// Hardware timestamp in microseconds since the top of the hour.
    pub fn timestamp(&self) -> u32 {
        let s = &self.slice[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4];
        u32::from_le_bytes([s[0], s[1], s[2], s[3]])
    }

    /// Firing block `index` (0-11).
    ///
    /// Fails with [`Error::UnknownBlockId`] or [`Error::AzimuthOutOfRange`] if
    /// the block is malformed.
    pub fn block(&self, index: usize) -> Result<FiringBlockSlice<'a>, Error> {
        let start = index * FIRING_BLOCK_SIZE;
        FiringBlockSlice::from_slice(&self.slice[start..start + FIRING_BLOCK_SIZE])
    }

    /// All 12 firing blocks in datagram order.
    pub fn blocks(&self) -> impl Iterator<Item = Result<FiringBlockSlice<'a>, Error>> + use<'a> {
        let packet = *self;
        (0..FIRINGS_PER_PACKET).map(move |i| packet.block(i))
    }
}

/// Zero-copy view of a validated firing block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FiringBlockSlice<'a> {
    slice: &'a [u8],
    block_id: BlockId,
}

impl<'a> FiringBlockSlice<'a> {
    /// Validate the block marker and azimuth of a 100-byte block.
    pub fn from_slice(slice: &'a [u8]) -> Result<FiringBlockSlice<'a>, Error> {
        if slice.len() < FIRING_BLOCK_SIZE {
            return Err(Error::InvalidLength(slice.len()));
        }

        let block_id = BlockId::try_from(u16::from_le_bytes([slice[0], slice[1]]))?;

        let azimuth = u16::from_le_bytes([slice[2], slice[3]]);
        if azimuth as usize >= NUM_ROT_ANGLES {
            return Err(Error::AzimuthOutOfRange(azimuth));
        }

        Ok(FiringBlockSlice { slice, block_id })
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Rotational position in hundredths of a degree, [0, 36000).
    pub fn azimuth(&self) -> u16 {
        u16::from_le_bytes([self.slice[2], self.slice[3]])
    }

    /// Laser return `index` (0-31).
    pub fn laser_return(&self, index: usize) -> LaserReturn {
        let s = &self.slice[4 + index * LASER_RETURN_SIZE..];
        LaserReturn {
            laser_id: index as u8 + self.block_id.laser_offset(),
            distance: u16::from_le_bytes([s[0], s[1]]),
            intensity: s[2],
        }
    }

    /// All 32 laser returns, including those with no echo.
    pub fn returns(&self) -> impl Iterator<Item = LaserReturn> + use<'a> {
        let block = *self;
        (0..LASERS_PER_FIRING).map(move |i| block.laser_return(i))
    }
}

/// Builder for synthetic datagrams, used by tests and benchmarks.
#[derive(Clone, Debug)]
pub struct DatagramBuilder {
    data: Vec<u8>,
}

impl DatagramBuilder {
    /// Start a datagram with every block marked for lasers 0-31, azimuth 0
    /// and no returns.
    pub fn new() -> Self {
        let mut builder = Self {
            data: vec![0; DATAGRAM_SIZE],
        };
        for i in 0..FIRINGS_PER_PACKET {
            builder = builder.block_marker(i, BLOCK_0_TO_31);
        }
        builder
    }

    /// Set the raw marker of block `index`.
    pub fn block_marker(mut self, index: usize, marker: u16) -> Self {
        let start = index * FIRING_BLOCK_SIZE;
        self.data[start..start + 2].copy_from_slice(&marker.to_le_bytes());
        self
    }

    /// Set the azimuth of block `index`.
    pub fn azimuth(mut self, index: usize, azimuth: u16) -> Self {
        let start = index * FIRING_BLOCK_SIZE + 2;
        self.data[start..start + 2].copy_from_slice(&azimuth.to_le_bytes());
        self
    }

    /// Set the azimuths of all 12 blocks.
    pub fn azimuths(mut self, azimuths: [u16; FIRINGS_PER_PACKET]) -> Self {
        for (i, az) in azimuths.into_iter().enumerate() {
            self = self.azimuth(i, az);
        }
        self
    }

    /// Set laser return `laser` of block `index`.
    pub fn laser_return(mut self, index: usize, laser: usize, distance: u16, intensity: u8) -> Self {
        let start = index * FIRING_BLOCK_SIZE + 4 + laser * LASER_RETURN_SIZE;
        self.data[start..start + 2].copy_from_slice(&distance.to_le_bytes());
        self.data[start + 2] = intensity;
        self
    }

    /// Give every laser of every block the same return.
    pub fn fill_returns(mut self, distance: u16, intensity: u8) -> Self {
        for i in 0..FIRINGS_PER_PACKET {
            for laser in 0..LASERS_PER_FIRING {
                self = self.laser_return(i, laser, distance, intensity);
            }
        }
        self
    }

    /// Set the hardware timestamp.
    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.data[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&timestamp.to_le_bytes());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

impl Default for DatagramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
