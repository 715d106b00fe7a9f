//! OLE Compound File Binary (CFB) reader for legacy Excel (.xls) uploads
//! Only the parts needed to pull a named stream out of the container are implemented.

use crate::error::SheetError;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use crate::helpers::string::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

const MAX_REG_SECT: usize = 0xFFFFFFFA;
const HEADER_SIZE: usize = 512;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: usize = 4096;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;

#[derive(Error, Debug)]
pub(crate) enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid Sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("The number of double indirect file allocation table error: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table error: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Sector '{0}' is out of range")]
    SectorOutOfRange(usize),

    #[error("Sector chain starting at '{0}' loops back on itself")]
    SectorChainCycle(usize),

    #[error("Empty Root directory")]
    RootDirectoryError,
}

/// Compound file loaded fully in memory.
pub(crate) struct Cfb {
    directories: HashMap<String, Directory>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors,
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, SheetError> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        if size < HEADER_SIZE {
            Err(CfbError::FileFormatError)?;
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data = vec![0u8; HEADER_SIZE];
        reader.read_exact(&mut data)?;
        let header = Header::new(&data)?;
        data.resize(size, 0);
        reader.read_exact(&mut data[HEADER_SIZE..])?;

        let sector_size = header.sector_size()?;
        let sectors = Sectors { data, size: sector_size, skip: 1 };
        let file_allocation_table = Self::load_file_allocation_table(&sectors, &header)?;
        let directories = Self::load_directories(&file_allocation_table, &sectors, header.directory_shift)?;
        let mini_file_allocation_table = Self::load_mini_file_allocation_table(&file_allocation_table, &sectors, &header)?;
        let mini_sectors = match directories.get("Root Entry") {
            Some(root) => Self::load_mini_sectors(&file_allocation_table, &sectors, root)?,
            None => Sectors { data: Vec::new(), size: MINI_SECTOR_SIZE, skip: 0 },
        };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors,
        })
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directories.contains_key(name)
    }

    /// Reads a whole stream by directory name.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, SheetError> {
        let Some(directory) = self.directories.get(name) else {
            return Ok(None);
        };
        let mut bytes = if directory.count < MINI_STREAM_CUTOFF {
            Self::read_chain(&self.mini_file_allocation_table, &self.mini_sectors, directory.index)?
        } else {
            Self::read_chain(&self.file_allocation_table, &self.sectors, directory.index)?
        };
        if bytes.len() < directory.count {
            Err(CfbError::FileFormatError)?;
        }
        bytes.truncate(directory.count);
        Ok(Some(bytes))
    }

    fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, SheetError> {
        let mut difat: Vec<usize> = to_usize_iter(&sectors.data[76..HEADER_SIZE]).collect();

        let mut count = 0usize;
        let mut index = header.double_indirect_file_allocation_table_shift;
        while index < MAX_REG_SECT {
            if count >= sectors.count() {
                Err(CfbError::SectorChainCycle(header.double_indirect_file_allocation_table_shift))?;
            }
            difat.extend(to_usize_iter(sectors.get(index)?));
            index = difat.pop().ok_or(CfbError::FileFormatError)?;
            count += 1;
        }
        if count != header.double_indirect_file_allocation_table_count {
            Err(CfbError::DoubleIndirectFileAllocationTableError(header.double_indirect_file_allocation_table_count, count))?
        }

        let mut table = Vec::new();
        let mut count = 0usize;
        for index in difat.into_iter().filter(|index| *index < MAX_REG_SECT) {
            table.extend(to_usize_iter(sectors.get(index)?));
            count += 1;
        }
        if count != header.file_allocation_table_count {
            Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?
        }
        Ok(table)
    }

    fn load_directories(table: &[usize], sectors: &Sectors, index: usize) -> Result<HashMap<String, Directory>, SheetError> {
        let bytes = Self::read_chain(table, sectors, index)?;
        let directories: HashMap<String, Directory> = bytes
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .filter_map(Directory::new)
            .collect();
        if directories.is_empty() {
            Err(CfbError::RootDirectoryError)?
        }
        Ok(directories)
    }

    fn load_mini_file_allocation_table(table: &[usize], sectors: &Sectors, header: &Header) -> Result<Vec<usize>, SheetError> {
        Ok(if header.mini_file_allocation_table_sector_count > 0 {
            let bytes = Self::read_chain(table, sectors, header.mini_file_allocation_table_sector_shift)?;
            to_usize_iter(&bytes).collect()
        } else {
            Vec::new()
        })
    }

    fn load_mini_sectors(table: &[usize], sectors: &Sectors, root: &Directory) -> Result<Sectors, SheetError> {
        let mut data = Self::read_chain(table, sectors, root.index)?;
        data.truncate(root.count);
        Ok(Sectors { data, size: MINI_SECTOR_SIZE, skip: 0 })
    }

    /// Concatenates the sectors of a chain, rejecting out-of-range links and loops.
    fn read_chain(table: &[usize], sectors: &Sectors, start: usize) -> Result<Vec<u8>, SheetError> {
        let mut content = Vec::new();
        let mut index = start;
        let mut steps = 0usize;
        while index < MAX_REG_SECT {
            if steps > table.len() {
                Err(CfbError::SectorChainCycle(start))?;
            }
            content.extend_from_slice(sectors.get(index)?);
            index = *table.get(index).ok_or(CfbError::SectorOutOfRange(index))?;
            steps += 1;
        }
        Ok(content)
    }
}

/// Fixed-size sectors over a byte buffer. `skip` sectors at the front are reserved (the header).
struct Sectors {
    data: Vec<u8>,
    size: usize,
    skip: usize,
}

impl Sectors {
    fn get(&self, index: usize) -> Result<&[u8], CfbError> {
        let source = index
            .checked_add(self.skip)
            .and_then(|position| position.checked_mul(self.size))
            .ok_or(CfbError::SectorOutOfRange(index))?;
        if source >= self.data.len() {
            return Err(CfbError::SectorOutOfRange(index));
        }
        let target = self.data.len().min(source + self.size);
        Ok(&self.data[source..target])
    }

    fn count(&self) -> usize {
        (self.data.len() / self.size).saturating_sub(self.skip) + 1
    }
}

struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_shift: usize,
    mini_file_allocation_table_sector_shift: usize,
    mini_file_allocation_table_sector_count: usize,
    double_indirect_file_allocation_table_shift: usize,
    double_indirect_file_allocation_table_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, SheetError> {
        if to_u64(&data[0..8]) != SIGNATURE {
            Err(CfbError::OleSignatureError)?;
        }
        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            file_allocation_table_count: to_usize(&data[44..48]),
            directory_shift: to_usize(&data[48..52]),
            mini_file_allocation_table_sector_shift: to_usize(&data[60..64]),
            mini_file_allocation_table_sector_count: to_usize(&data[64..68]),
            double_indirect_file_allocation_table_shift: to_usize(&data[68..72]),
            double_indirect_file_allocation_table_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, SheetError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) => Ok(512),
            // version 4 pads the header out to a full 4096-byte sector
            (4, 12) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift))?,
        }
    }
}

struct Directory {
    index: usize,
    count: usize,
}

impl Directory {
    fn new(bytes: &[u8]) -> Option<(String, Directory)> {
        let size = (to_u16(&bytes[64..66]) as usize).min(64);
        if size == 0 {
            return None;
        }
        let (name, _, _) = UTF_16LE.decode(&bytes[..size]);
        let name = match name.find('\0') {
            Some(position) => name[..position].to_owned(),
            None => name.into_owned(),
        };
        let index = to_usize(&bytes[116..120]);
        let count = to_u64(&bytes[120..128]) as usize;
        Some((name, Directory { index, count }))
    }
}
