// This module implements the minidump reader. MinidumpFile is built once through the
// fallible MinidumpFile::create factory, which validates the fixed header (signature and
// the low 16 bits of the version), slices the stream directory and every stream it
// describes with overflow-safe bounds checks, and builds the stream map from stream type
// to directory index. Unused zero-sized entries are skipped, exception streams are kept
// out of the map in a side list because a dump carries one per faulting thread, reserved
// tags are rejected and duplicates of any other type are a hard error. After construction
// all accessors are lazy: raw stream lookup, UTF-16 strings, fixed-stride list streams
// (with the 4/8 byte payload padding heuristic), single-record streams, the variable
// stride memory info list and the re-scanned exception streams. All slicing goes through
// data_slice/data_slice_as which re-check bounds on every call.

//! Minidump (crash dump) container reader.
//!
//! # Example
//!
//! ```ignore
//! use dumpexpr::minidump::{MinidumpFile, StreamType};
//!
//! let bytes = std::fs::read("core.dmp")?;
//! let file = MinidumpFile::create(&bytes)?;
//! for module in file.module_list()? {
//!     println!("{}", file.get_string(module.module_name_rva.get(LE).into())?);
//! }
//! ```

pub mod format;
pub mod memory_info;

pub use format::{
    Directory, ExceptionRecord, ExceptionStream, Header, LocationDescriptor, MemoryDescriptor,
    MemoryInfo, MemoryInfoListHeader, Module, StreamType, SystemInfo, Thread, VsFixedFileInfo,
};
pub use memory_info::MemoryInfoIter;

use crate::core::error::{MinidumpError, MinidumpResult};
use hashbrown::hash_map::{Entry, HashMap};
use object::endian::{LittleEndian as LE, U16Bytes, U32Bytes};
use object::pod::{self, Pod};
use std::mem::size_of;

/// Slice `size` bytes at `offset` out of `data`.
///
/// The end is computed with a checked add before it is compared against the
/// buffer length, so wrapped offsets are caught as well as long ones.
pub fn data_slice(data: &[u8], offset: u64, size: u64) -> MinidumpResult<&[u8]> {
    let out_of_bounds = || MinidumpError::OutOfBounds {
        offset,
        size,
        available: data.len() as u64,
    };
    let end = offset.checked_add(size).ok_or_else(out_of_bounds)?;
    if end > data.len() as u64 {
        return Err(out_of_bounds());
    }
    // Both bounds fit in the buffer length, so they fit in usize.
    Ok(&data[offset as usize..end as usize])
}

/// Reinterpret `count` consecutive `T` records at `offset`.
pub fn data_slice_as<T: Pod>(data: &[u8], offset: u64, count: u64) -> MinidumpResult<&[T]> {
    let size = (size_of::<T>() as u64)
        .checked_mul(count)
        .ok_or(MinidumpError::OutOfBounds {
            offset,
            size: u64::MAX,
            available: data.len() as u64,
        })?;
    let bytes = data_slice(data, offset, size)?;
    let (records, _) =
        pod::slice_from_bytes::<T>(bytes, count as usize).map_err(|()| MinidumpError::OutOfBounds {
            offset,
            size,
            available: data.len() as u64,
        })?;
    Ok(records)
}

/// A validated minidump.
///
/// The stream directory and every stream location it names have been
/// bounds-checked by [`MinidumpFile::create`]; accessors still re-check each
/// slice they take.
#[derive(Debug)]
pub struct MinidumpFile<'data> {
    data: &'data [u8],
    header: &'data Header,
    streams: &'data [Directory],
    stream_map: HashMap<StreamType, usize>,
    /// Directory indices of the exception streams, which are not in `stream_map`.
    exception_streams: Vec<usize>,
}

impl<'data> MinidumpFile<'data> {
    /// Parse and validate `data`.
    ///
    /// No partially constructed reader is ever returned: any structural
    /// problem with the header or the directory fails the whole parse.
    pub fn create(data: &'data [u8]) -> MinidumpResult<Self> {
        let header_size = size_of::<Header>() as u64;
        if (data.len() as u64) < header_size {
            return Err(MinidumpError::TruncatedInput {
                offset: 0,
                needed: header_size,
                available: data.len() as u64,
            });
        }
        let header = &data_slice_as::<Header>(data, 0, 1)?[0];

        let signature = header.signature.get(LE);
        if signature != Header::MAGIC_SIGNATURE {
            return Err(MinidumpError::InvalidSignature {
                found: signature,
                expected: Header::MAGIC_SIGNATURE,
            });
        }
        let version = header.version.get(LE) & Header::VERSION_MASK;
        if version != Header::MAGIC_VERSION {
            return Err(MinidumpError::UnsupportedVersion {
                found: version,
                expected: Header::MAGIC_VERSION,
            });
        }

        let streams = data_slice_as::<Directory>(
            data,
            header.stream_directory_rva.get(LE).into(),
            header.number_of_streams.get(LE).into(),
        )?;

        let mut stream_map = HashMap::with_capacity(streams.len());
        let mut exception_streams = Vec::new();
        for (index, descriptor) in streams.iter().enumerate() {
            let stream_type = descriptor.stream_type();
            let location = &descriptor.location;
            let size = location.data_size.get(LE);
            data_slice(data, location.rva.get(LE).into(), size.into())?;

            if stream_type == StreamType::UNUSED && size == 0 {
                // Ill-formed, but a number of existing producers pad the
                // directory with these.
                log::trace!("Skipping empty Unused stream at directory entry {index}");
                continue;
            }

            if stream_type == StreamType::EXCEPTION {
                // One per faulting thread; looked up by thread, not by type.
                log::trace!("Directory entry {index} is an exception stream");
                exception_streams.push(index);
                continue;
            }

            if stream_type.is_reserved_key() {
                return Err(MinidumpError::UnsupportedStreamType { stream_type, index });
            }

            match stream_map.entry(stream_type) {
                Entry::Occupied(existing) => {
                    return Err(MinidumpError::DuplicateStreamType {
                        stream_type,
                        first: *existing.get(),
                        second: index,
                    });
                }
                Entry::Vacant(slot) => {
                    log::trace!("Directory entry {index}: {stream_type}, {size} bytes");
                    slot.insert(index);
                }
            }
        }

        log::debug!(
            "Parsed minidump: {} directory entries, {} indexed streams, {} exception streams",
            streams.len(),
            stream_map.len(),
            exception_streams.len()
        );

        Ok(Self {
            data,
            header,
            streams,
            stream_map,
            exception_streams,
        })
    }

    /// The whole underlying buffer.
    pub fn data(&self) -> &'data [u8] {
        self.data
    }

    pub fn header(&self) -> &'data Header {
        self.header
    }

    /// The raw stream directory, including skipped and exception entries.
    pub fn streams(&self) -> &'data [Directory] {
        self.streams
    }

    /// Directory indices of the exception streams.
    pub fn exception_stream_indices(&self) -> &[usize] {
        &self.exception_streams
    }

    pub fn exception_stream_count(&self) -> usize {
        self.exception_streams.len()
    }

    /// Contents of the stream of the given type, or `None` when the dump does
    /// not have one. Exception streams are never returned here.
    pub fn raw_stream(&self, stream_type: StreamType) -> Option<&'data [u8]> {
        let index = *self.stream_map.get(&stream_type)?;
        self.raw_stream_for(&self.streams[index]).ok()
    }

    /// Contents of the stream described by a directory entry.
    pub fn raw_stream_for(&self, directory: &Directory) -> MinidumpResult<&'data [u8]> {
        self.memory(&directory.location)
    }

    /// Bytes of an arbitrary location in the file.
    pub fn memory(&self, location: &LocationDescriptor) -> MinidumpResult<&'data [u8]> {
        data_slice(
            self.data,
            location.rva.get(LE).into(),
            location.data_size.get(LE).into(),
        )
    }

    fn required_stream(&self, stream_type: StreamType) -> MinidumpResult<&'data [u8]> {
        self.raw_stream(stream_type)
            .ok_or(MinidumpError::NoSuchStream { stream_type })
    }

    /// Read a minidump string: a 32-bit byte length followed by that many
    /// bytes of UTF-16LE.
    pub fn get_string(&self, offset: u64) -> MinidumpResult<String> {
        let length = data_slice_as::<U32Bytes<LE>>(self.data, offset, 1)?[0].get(LE);
        if length % 2 != 0 {
            return Err(MinidumpError::InvalidStringLength { offset, length });
        }
        if length == 0 {
            return Ok(String::new());
        }

        let units_offset = offset
            .checked_add(size_of::<U32Bytes<LE>>() as u64)
            .ok_or(MinidumpError::OutOfBounds {
                offset,
                size: u64::from(length),
                available: self.data.len() as u64,
            })?;
        let units = data_slice_as::<U16Bytes<LE>>(self.data, units_offset, u64::from(length / 2))?;
        char::decode_utf16(units.iter().map(|unit| unit.get(LE)))
            .collect::<Result<String, _>>()
            .map_err(|_| MinidumpError::StringDecodingFailed { offset })
    }

    /// Read a list stream: a 32-bit element count followed by the elements.
    pub fn get_list_stream<T: Pod>(&self, stream_type: StreamType) -> MinidumpResult<&'data [T]> {
        let stream = self.required_stream(stream_type)?;
        let count = u64::from(data_slice_as::<U32Bytes<LE>>(stream, 0, 1)?[0].get(LE));

        // Some producers pad the count to align the list on an 8-byte
        // boundary. Nothing in the stream says so; the only tell is that the
        // unpadded list would end short of the stream.
        let mut list_offset = 4;
        let unpadded_end = (size_of::<T>() as u64)
            .checked_mul(count)
            .and_then(|size| size.checked_add(list_offset));
        if matches!(unpadded_end, Some(end) if end < stream.len() as u64) {
            list_offset = 8;
        }

        data_slice_as::<T>(stream, list_offset, count)
    }

    /// Read a stream holding exactly one `T` record (trailing bytes are
    /// allowed).
    pub fn get_stream<T: Pod>(&self, stream_type: StreamType) -> MinidumpResult<&'data T> {
        let stream = self.required_stream(stream_type)?;
        Ok(&data_slice_as::<T>(stream, 0, 1)?[0])
    }

    pub fn module_list(&self) -> MinidumpResult<&'data [Module]> {
        self.get_list_stream(StreamType::MODULE_LIST)
    }

    pub fn thread_list(&self) -> MinidumpResult<&'data [Thread]> {
        self.get_list_stream(StreamType::THREAD_LIST)
    }

    pub fn memory_list(&self) -> MinidumpResult<&'data [MemoryDescriptor]> {
        self.get_list_stream(StreamType::MEMORY_LIST)
    }

    pub fn system_info(&self) -> MinidumpResult<&'data SystemInfo> {
        self.get_stream(StreamType::SYSTEM_INFO)
    }

    /// Iterate the memory info list.
    ///
    /// Entries are indexed with the stride the stream declares, which may be
    /// larger than [`MemoryInfo`] in newer producers.
    pub fn get_memory_info_list(&self) -> MinidumpResult<MemoryInfoIter<'data>> {
        let stream = self.required_stream(StreamType::MEMORY_INFO_LIST)?;
        let header = &data_slice_as::<MemoryInfoListHeader>(stream, 0, 1)?[0];
        let size_of_header = u64::from(header.size_of_header.get(LE));
        let size_of_entry = u64::from(header.size_of_entry.get(LE));
        let number_of_entries = header.number_of_entries.get(LE);

        if number_of_entries != 0 && size_of_entry < size_of::<MemoryInfo>() as u64 {
            return Err(MinidumpError::TruncatedInput {
                offset: size_of_header,
                needed: size_of::<MemoryInfo>() as u64,
                available: size_of_entry,
            });
        }

        let size = size_of_entry
            .checked_mul(number_of_entries)
            .ok_or(MinidumpError::OutOfBounds {
                offset: size_of_header,
                size: u64::MAX,
                available: stream.len() as u64,
            })?;
        let entries = data_slice(stream, size_of_header, size)?;
        Ok(MemoryInfoIter::new(entries, size_of_entry as usize))
    }

    /// Decode every exception stream in the directory.
    ///
    /// The directory is scanned again here; each record found is checked
    /// against the one the index built by [`MinidumpFile::create`] leads to.
    pub fn get_exception_streams(&self) -> MinidumpResult<Vec<&'data ExceptionStream>> {
        let directories: Vec<(usize, &Directory)> = self
            .streams
            .iter()
            .enumerate()
            .filter(|(_, directory)| directory.stream_type() == StreamType::EXCEPTION)
            .collect();

        if directories.is_empty() {
            return Err(MinidumpError::NoExceptionStreams);
        }

        let mut exceptions = Vec::with_capacity(directories.len());
        for (index, directory) in directories {
            let stream = self.raw_stream_for(directory)?;
            let exception = &data_slice_as::<ExceptionStream>(stream, 0, 1)?[0];
            let thread_id = exception.thread_id.get(LE);

            let indexed_thread_id = self.indexed_exception_thread_id(exceptions.len());
            debug_assert_eq!(
                indexed_thread_id,
                Some(thread_id),
                "Exception stream at directory entry {index} disagrees with the index"
            );
            if indexed_thread_id != Some(thread_id) {
                log::warn!("Exception stream at directory entry {index} disagrees with the index");
            }

            log::debug!(
                "Exception stream #{}: thread {:#x}, code {:#x}",
                exceptions.len(),
                thread_id,
                exception.exception_record.exception_code.get(LE)
            );
            exceptions.push(exception);
        }
        Ok(exceptions)
    }

    /// Thread id of the `position`th exception stream, reached through the
    /// directory indices recorded at parse time.
    fn indexed_exception_thread_id(&self, position: usize) -> Option<u32> {
        let directory = self.streams.get(*self.exception_streams.get(position)?)?;
        let stream = self.raw_stream_for(directory).ok()?;
        let thread_id = data_slice_as::<U32Bytes<LE>>(stream, 0, 1).ok()?;
        Some(thread_id[0].get(LE))
    }
}
