//! On-disk minidump records.
//!
//! Every record is a packed `#[repr(C)]` struct of unaligned little-endian
//! fields, so any byte offset inside the buffer can be reinterpreted in place
//! through [`object::pod`].

use object::endian::{LittleEndian as LE, U16Bytes, U32Bytes, U64Bytes};
use object::pod::Pod;
use std::fmt;

/// Stream type tag of a directory entry.
///
/// This is an open set: producers are free to emit tags this reader has no
/// name for, and those are still indexed by the stream map.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamType(pub u32);

impl StreamType {
    pub const UNUSED: Self = Self(0);
    pub const RESERVED0: Self = Self(1);
    pub const RESERVED1: Self = Self(2);
    pub const THREAD_LIST: Self = Self(3);
    pub const MODULE_LIST: Self = Self(4);
    pub const MEMORY_LIST: Self = Self(5);
    pub const EXCEPTION: Self = Self(6);
    pub const SYSTEM_INFO: Self = Self(7);
    pub const THREAD_EX_LIST: Self = Self(8);
    pub const MEMORY64_LIST: Self = Self(9);
    pub const COMMENT_A: Self = Self(10);
    pub const COMMENT_W: Self = Self(11);
    pub const HANDLE_DATA: Self = Self(12);
    pub const FUNCTION_TABLE: Self = Self(13);
    pub const UNLOADED_MODULE_LIST: Self = Self(14);
    pub const MISC_INFO: Self = Self(15);
    pub const MEMORY_INFO_LIST: Self = Self(16);
    pub const THREAD_INFO_LIST: Self = Self(17);
    pub const HANDLE_OPERATION_LIST: Self = Self(18);
    pub const TOKEN: Self = Self(19);
    pub const JAVASCRIPT_DATA: Self = Self(20);
    pub const SYSTEM_MEMORY_INFO: Self = Self(21);
    pub const PROCESS_VM_COUNTERS: Self = Self(22);

    // Breakpad extensions.
    pub const BREAKPAD_INFO: Self = Self(0x4767_0001);
    pub const ASSERTION_INFO: Self = Self(0x4767_0002);
    pub const LINUX_CPU_INFO: Self = Self(0x4767_0003);
    pub const LINUX_PROC_STATUS: Self = Self(0x4767_0004);
    pub const LINUX_LSB_RELEASE: Self = Self(0x4767_0005);
    pub const LINUX_CMD_LINE: Self = Self(0x4767_0006);
    pub const LINUX_ENVIRON: Self = Self(0x4767_0007);
    pub const LINUX_AUXV: Self = Self(0x4767_0008);
    pub const LINUX_MAPS: Self = Self(0x4767_0009);
    pub const LINUX_DSO_DEBUG: Self = Self(0x4767_000A);

    pub const LLDB_GENERATED: Self = Self(0x4C4C_4442);

    /// Tags that can never name a real stream. Rejected when building the
    /// stream map.
    pub const RESERVED_EMPTY_KEY: Self = Self(u32::MAX);
    pub const RESERVED_TOMBSTONE_KEY: Self = Self(u32::MAX - 1);

    pub fn is_reserved_key(self) -> bool {
        self == Self::RESERVED_EMPTY_KEY || self == Self::RESERVED_TOMBSTONE_KEY
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::UNUSED => "Unused",
            Self::RESERVED0 => "Reserved0",
            Self::RESERVED1 => "Reserved1",
            Self::THREAD_LIST => "ThreadList",
            Self::MODULE_LIST => "ModuleList",
            Self::MEMORY_LIST => "MemoryList",
            Self::EXCEPTION => "Exception",
            Self::SYSTEM_INFO => "SystemInfo",
            Self::THREAD_EX_LIST => "ThreadExList",
            Self::MEMORY64_LIST => "Memory64List",
            Self::COMMENT_A => "CommentA",
            Self::COMMENT_W => "CommentW",
            Self::HANDLE_DATA => "HandleData",
            Self::FUNCTION_TABLE => "FunctionTable",
            Self::UNLOADED_MODULE_LIST => "UnloadedModuleList",
            Self::MISC_INFO => "MiscInfo",
            Self::MEMORY_INFO_LIST => "MemoryInfoList",
            Self::THREAD_INFO_LIST => "ThreadInfoList",
            Self::HANDLE_OPERATION_LIST => "HandleOperationList",
            Self::TOKEN => "Token",
            Self::JAVASCRIPT_DATA => "JavascriptData",
            Self::SYSTEM_MEMORY_INFO => "SystemMemoryInfo",
            Self::PROCESS_VM_COUNTERS => "ProcessVMCounters",
            Self::BREAKPAD_INFO => "BreakpadInfo",
            Self::ASSERTION_INFO => "AssertionInfo",
            Self::LINUX_CPU_INFO => "LinuxCPUInfo",
            Self::LINUX_PROC_STATUS => "LinuxProcStatus",
            Self::LINUX_LSB_RELEASE => "LinuxLSBRelease",
            Self::LINUX_CMD_LINE => "LinuxCMDLine",
            Self::LINUX_ENVIRON => "LinuxEnviron",
            Self::LINUX_AUXV => "LinuxAuxv",
            Self::LINUX_MAPS => "LinuxMaps",
            Self::LINUX_DSO_DEBUG => "LinuxDSODebug",
            Self::LLDB_GENERATED => "LLDBGenerated",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl fmt::Debug for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamType({self})")
    }
}

/// File header at offset 0.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Header {
    pub signature: U32Bytes<LE>,
    pub version: U32Bytes<LE>,
    pub number_of_streams: U32Bytes<LE>,
    pub stream_directory_rva: U32Bytes<LE>,
    pub checksum: U32Bytes<LE>,
    pub time_date_stamp: U32Bytes<LE>,
    pub flags: U64Bytes<LE>,
}

impl Header {
    /// "MDMP"
    pub const MAGIC_SIGNATURE: u32 = 0x504D_444D;
    /// Only the low 16 bits of the version field are checked; the high bits
    /// are implementation specific.
    pub const MAGIC_VERSION: u32 = 0xA793;
    pub const VERSION_MASK: u32 = 0xFFFF;
}

/// Size and position of a region of the file.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct LocationDescriptor {
    pub data_size: U32Bytes<LE>,
    pub rva: U32Bytes<LE>,
}

impl LocationDescriptor {
    pub fn new(rva: u32, data_size: u32) -> Self {
        Self {
            data_size: U32Bytes::new(LE, data_size),
            rva: U32Bytes::new(LE, rva),
        }
    }
}

/// One entry of the stream directory.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Directory {
    pub stream_type: U32Bytes<LE>,
    pub location: LocationDescriptor,
}

impl Directory {
    pub fn stream_type(&self) -> StreamType {
        StreamType(self.stream_type.get(LE))
    }
}

/// A captured range of target memory.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MemoryDescriptor {
    pub start_of_memory_range: U64Bytes<LE>,
    pub memory: LocationDescriptor,
}

/// Windows `VS_FIXEDFILEINFO`.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct VsFixedFileInfo {
    pub signature: U32Bytes<LE>,
    pub struct_version: U32Bytes<LE>,
    pub file_version_high: U32Bytes<LE>,
    pub file_version_low: U32Bytes<LE>,
    pub product_version_high: U32Bytes<LE>,
    pub product_version_low: U32Bytes<LE>,
    pub file_flags_mask: U32Bytes<LE>,
    pub file_flags: U32Bytes<LE>,
    pub file_os: U32Bytes<LE>,
    pub file_type: U32Bytes<LE>,
    pub file_subtype: U32Bytes<LE>,
    pub file_date_high: U32Bytes<LE>,
    pub file_date_low: U32Bytes<LE>,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Module {
    pub base_of_image: U64Bytes<LE>,
    pub size_of_image: U32Bytes<LE>,
    pub checksum: U32Bytes<LE>,
    pub time_date_stamp: U32Bytes<LE>,
    pub module_name_rva: U32Bytes<LE>,
    pub version_info: VsFixedFileInfo,
    pub cv_record: LocationDescriptor,
    pub misc_record: LocationDescriptor,
    pub reserved0: U64Bytes<LE>,
    pub reserved1: U64Bytes<LE>,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Thread {
    pub thread_id: U32Bytes<LE>,
    pub suspend_count: U32Bytes<LE>,
    pub priority_class: U32Bytes<LE>,
    pub priority: U32Bytes<LE>,
    pub environment_block: U64Bytes<LE>,
    pub stack: MemoryDescriptor,
    pub context: LocationDescriptor,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ExceptionRecord {
    pub exception_code: U32Bytes<LE>,
    pub exception_flags: U32Bytes<LE>,
    pub exception_record: U64Bytes<LE>,
    pub exception_address: U64Bytes<LE>,
    pub number_parameters: U32Bytes<LE>,
    pub unused_alignment: U32Bytes<LE>,
    pub exception_information: [U64Bytes<LE>; ExceptionRecord::MAX_PARAMETERS],
}

impl ExceptionRecord {
    pub const MAX_PARAMETERS: usize = 15;

    /// Parameters actually in use, clamped to the fixed array.
    pub fn parameters(&self) -> impl Iterator<Item = u64> + '_ {
        let count = (self.number_parameters.get(LE) as usize).min(Self::MAX_PARAMETERS);
        self.exception_information[..count].iter().map(|p| p.get(LE))
    }
}

/// Payload of an `Exception` stream. One per faulting thread.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ExceptionStream {
    pub thread_id: U32Bytes<LE>,
    pub unused_alignment: U32Bytes<LE>,
    pub exception_record: ExceptionRecord,
    pub thread_context: LocationDescriptor,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SystemInfo {
    pub processor_arch: U16Bytes<LE>,
    pub processor_level: U16Bytes<LE>,
    pub processor_revision: U16Bytes<LE>,
    pub number_of_processors: u8,
    pub product_type: u8,
    pub major_version: U32Bytes<LE>,
    pub minor_version: U32Bytes<LE>,
    pub build_number: U32Bytes<LE>,
    pub platform_id: U32Bytes<LE>,
    pub csd_version_rva: U32Bytes<LE>,
    pub suite_mask: U16Bytes<LE>,
    pub reserved: U16Bytes<LE>,
    pub cpu: [u8; 24],
}

/// Leading record of a `MemoryInfoList` stream.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MemoryInfoListHeader {
    pub size_of_header: U32Bytes<LE>,
    pub size_of_entry: U32Bytes<LE>,
    pub number_of_entries: U64Bytes<LE>,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MemoryInfo {
    pub base_address: U64Bytes<LE>,
    pub allocation_base: U64Bytes<LE>,
    pub allocation_protect: U32Bytes<LE>,
    pub reserved0: U32Bytes<LE>,
    pub region_size: U64Bytes<LE>,
    pub state: U32Bytes<LE>,
    pub protect: U32Bytes<LE>,
    pub memory_type: U32Bytes<LE>,
    pub reserved1: U32Bytes<LE>,
}

// SAFETY: all of the above are repr(C) aggregates of byte-array field types,
// so they have alignment 1, no padding and every bit pattern is valid.
unsafe impl Pod for Header {}
unsafe impl Pod for LocationDescriptor {}
unsafe impl Pod for Directory {}
unsafe impl Pod for MemoryDescriptor {}
unsafe impl Pod for VsFixedFileInfo {}
unsafe impl Pod for Module {}
unsafe impl Pod for Thread {}
unsafe impl Pod for ExceptionRecord {}
unsafe impl Pod for ExceptionStream {}
unsafe impl Pod for SystemInfo {}
unsafe impl Pod for MemoryInfoListHeader {}
unsafe impl Pod for MemoryInfo {}
