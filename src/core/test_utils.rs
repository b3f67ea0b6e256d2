//! Test utilities.
//!
//! [`MinidumpBuilder`] assembles minidump images byte by byte, so reader
//! tests can describe exactly the layout (and the corruption) they need. It
//! is only built for unit tests and with the `test-utils` feature, which the
//! integration tests under `tests/` enable.
//!
//! The image layout is: header at offset 0, stream data and strings in the
//! order they were added (each blob 4-byte aligned), and the stream directory
//! last. Placing the directory last means every RVA is known the moment its
//! blob is added.

use crate::minidump::{Header, StreamType};

const HEADER_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy)]
struct DirectoryEntry {
    stream_type: u32,
    data_size: u32,
    rva: u32,
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_zeros(out: &mut Vec<u8>, count: usize) {
    out.resize(out.len() + count, 0);
}

/// Byte-level minidump image builder.
#[derive(Debug, Clone)]
pub struct MinidumpBuilder {
    signature: u32,
    version: u32,
    body: Vec<u8>,
    directory: Vec<DirectoryEntry>,
}

impl MinidumpBuilder {
    /// Start a valid, empty image. The version carries implementation
    /// specific bits in its high half, as real producers do.
    pub fn new() -> Self {
        Self {
            signature: Header::MAGIC_SIGNATURE,
            version: 0x0004_0000 | Header::MAGIC_VERSION,
            body: Vec::new(),
            directory: Vec::new(),
        }
    }

    pub fn signature(mut self, signature: u32) -> Self {
        self.signature = signature;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// RVA the next added blob will land at.
    pub fn next_rva(&self) -> u32 {
        HEADER_SIZE + self.body.len() as u32
    }

    /// Append `bytes` to the image without a directory entry.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> u32 {
        let rva = self.next_rva();
        self.body.extend_from_slice(bytes);
        let aligned = self.body.len().next_multiple_of(4);
        self.body.resize(aligned, 0);
        rva
    }

    /// Add a directory entry pointing anywhere, including outside the image.
    pub fn add_directory_entry(&mut self, stream_type: StreamType, rva: u32, data_size: u32) -> &mut Self {
        self.directory.push(DirectoryEntry {
            stream_type: stream_type.0,
            data_size,
            rva,
        });
        self
    }

    /// Append `bytes` as a stream of `stream_type`. Returns its RVA.
    pub fn add_stream(&mut self, stream_type: StreamType, bytes: &[u8]) -> u32 {
        let rva = self.add_bytes(bytes);
        self.add_directory_entry(stream_type, rva, bytes.len() as u32);
        rva
    }

    /// Append a length-prefixed UTF-16 string. Returns its RVA.
    pub fn add_string(&mut self, value: &str) -> u32 {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.add_raw_string((units.len() * 2) as u32, &units)
    }

    /// Append a string record with an arbitrary byte length prefix.
    pub fn add_raw_string(&mut self, length: u32, units: &[u16]) -> u32 {
        let mut bytes = Vec::with_capacity(4 + units.len() * 2);
        push_u32(&mut bytes, length);
        for &unit in units {
            push_u16(&mut bytes, unit);
        }
        self.add_bytes(&bytes)
    }

    /// Append a list stream: a 32-bit count, four bytes of padding when
    /// `padded`, then the encoded records.
    pub fn add_list_stream(&mut self, stream_type: StreamType, count: u32, records: &[u8], padded: bool) -> u32 {
        let mut bytes = Vec::with_capacity(8 + records.len());
        push_u32(&mut bytes, count);
        if padded {
            push_zeros(&mut bytes, 4);
        }
        bytes.extend_from_slice(records);
        self.add_stream(stream_type, &bytes)
    }

    /// Module list of `(base, size, name)`. Names are added as strings.
    pub fn add_module_list(&mut self, modules: &[(u64, u32, &str)], padded: bool) -> u32 {
        let name_rvas: Vec<u32> = modules.iter().map(|&(_, _, name)| self.add_string(name)).collect();
        let mut records = Vec::new();
        for (&(base, size, _), name_rva) in modules.iter().zip(name_rvas) {
            push_u64(&mut records, base);
            push_u32(&mut records, size);
            push_u32(&mut records, 0); // checksum
            push_u32(&mut records, 0); // timestamp
            push_u32(&mut records, name_rva);
            push_zeros(&mut records, 13 * 4); // version info
            push_zeros(&mut records, 8 + 8 + 16);
        }
        self.add_list_stream(StreamType::MODULE_LIST, modules.len() as u32, &records, padded)
    }

    /// Thread list of `(thread_id, stack_start)`.
    pub fn add_thread_list(&mut self, threads: &[(u32, u64)], padded: bool) -> u32 {
        let mut records = Vec::new();
        for &(thread_id, stack_start) in threads {
            push_u32(&mut records, thread_id);
            push_zeros(&mut records, 3 * 4 + 8);
            push_u64(&mut records, stack_start);
            push_zeros(&mut records, 8 + 8);
        }
        self.add_list_stream(StreamType::THREAD_LIST, threads.len() as u32, &records, padded)
    }

    /// Memory list of `(start_address, contents)`. Contents are added to the
    /// image and referenced by each descriptor.
    pub fn add_memory_list(&mut self, ranges: &[(u64, &[u8])], padded: bool) -> u32 {
        let mut records = Vec::new();
        for &(start, contents) in ranges {
            let rva = self.add_bytes(contents);
            push_u64(&mut records, start);
            push_u32(&mut records, contents.len() as u32);
            push_u32(&mut records, rva);
        }
        self.add_list_stream(StreamType::MEMORY_LIST, ranges.len() as u32, &records, padded)
    }

    pub fn add_system_info(&mut self, processor_arch: u16, number_of_processors: u8) -> u32 {
        let mut bytes = Vec::with_capacity(56);
        push_u16(&mut bytes, processor_arch);
        push_zeros(&mut bytes, 4); // level, revision
        bytes.push(number_of_processors);
        bytes.push(0); // product type
        push_u32(&mut bytes, 10); // major version
        push_zeros(&mut bytes, 8); // minor version, build number
        push_u32(&mut bytes, 2); // platform id
        push_zeros(&mut bytes, 4 + 2 + 2 + 24);
        self.add_stream(StreamType::SYSTEM_INFO, &bytes)
    }

    /// Exception stream for `thread_id`.
    pub fn add_exception_stream(&mut self, thread_id: u32, code: u32, address: u64) -> u32 {
        let mut bytes = Vec::with_capacity(168);
        push_u32(&mut bytes, thread_id);
        push_u32(&mut bytes, 0);
        push_u32(&mut bytes, code);
        push_u32(&mut bytes, 0); // flags
        push_u64(&mut bytes, 0); // nested record
        push_u64(&mut bytes, address);
        push_u32(&mut bytes, 1); // parameter count
        push_u32(&mut bytes, 0);
        push_u64(&mut bytes, address);
        push_zeros(&mut bytes, 14 * 8);
        push_zeros(&mut bytes, 8); // thread context
        self.add_stream(StreamType::EXCEPTION, &bytes)
    }

    /// Memory info list of `(base, size, protect)` regions, each entry
    /// padded with filler (or cut) to `entry_size` bytes.
    pub fn add_memory_info_list(&mut self, regions: &[(u64, u64, u32)], entry_size: u32) -> u32 {
        let mut bytes = Vec::new();
        push_u32(&mut bytes, 16);
        push_u32(&mut bytes, entry_size);
        push_u64(&mut bytes, regions.len() as u64);
        for &(base, size, protect) in regions {
            let mut entry = Vec::with_capacity(48);
            push_u64(&mut entry, base);
            push_u64(&mut entry, base); // allocation base
            push_u32(&mut entry, protect); // allocation protect
            push_u32(&mut entry, 0);
            push_u64(&mut entry, size);
            push_u32(&mut entry, 0x1000); // MEM_COMMIT
            push_u32(&mut entry, protect);
            push_u32(&mut entry, 0x20000); // MEM_PRIVATE
            push_u32(&mut entry, 0);
            entry.resize(entry_size as usize, 0xcc);
            bytes.extend_from_slice(&entry);
        }
        self.add_stream(StreamType::MEMORY_INFO_LIST, &bytes)
    }

    /// Produce the image.
    pub fn build(&self) -> Vec<u8> {
        let directory_rva = self.next_rva();
        let mut out = Vec::with_capacity(directory_rva as usize + self.directory.len() * 12);
        push_u32(&mut out, self.signature);
        push_u32(&mut out, self.version);
        push_u32(&mut out, self.directory.len() as u32);
        push_u32(&mut out, directory_rva);
        push_u32(&mut out, 0); // checksum
        push_u32(&mut out, 0); // timestamp
        push_u64(&mut out, 0); // flags
        out.extend_from_slice(&self.body);
        for entry in &self.directory {
            push_u32(&mut out, entry.stream_type);
            push_u32(&mut out, entry.data_size);
            push_u32(&mut out, entry.rva);
        }
        out
    }
}

impl Default for MinidumpBuilder {
    fn default() -> Self {
        Self::new()
    }
}
