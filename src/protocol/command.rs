/// Operation code carried in a request record's `command` field.
///
/// Numbering follows `examples/original_source/osn_final/project-main/include/common.h`
/// so that the closed set of operations in spec.md S4 maps onto stable
/// wire values; [`Command::Heartbeat`] is new (SPEC_FULL.md S11).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    View = 1,
    Read = 2,
    Create = 3,
    Write = 4,
    Delete = 5,
    Info = 6,
    List = 7,
    AddAccess = 8,
    RemAccess = 9,
    Stream = 10,
    Undo = 11,
    Copy = 12,
    FileInfo = 13,
    Exec = 14,
    WriteCommit = 15,
    LockAcquire = 16,
    LockRelease = 17,
    CreateFolder = 18,
    Move = 19,
    ViewFolder = 20,
    Checkpoint = 21,
    ViewCheckpoint = 22,
    Revert = 23,
    ListCheckpoints = 24,
    RequestAccess = 25,
    ViewRequests = 26,
    ApproveRequest = 27,
    DenyRequest = 28,
    Heartbeat = 29,
    Unknown = 0,
}

impl Command {
    pub fn from_wire(value: u32) -> Command {
        match value {
            1 => Command::View,
            2 => Command::Read,
            3 => Command::Create,
            4 => Command::Write,
            5 => Command::Delete,
            6 => Command::Info,
            7 => Command::List,
            8 => Command::AddAccess,
            9 => Command::RemAccess,
            10 => Command::Stream,
            11 => Command::Undo,
            12 => Command::Copy,
            13 => Command::FileInfo,
            14 => Command::Exec,
            15 => Command::WriteCommit,
            16 => Command::LockAcquire,
            17 => Command::LockRelease,
            18 => Command::CreateFolder,
            19 => Command::Move,
            20 => Command::ViewFolder,
            21 => Command::Checkpoint,
            22 => Command::ViewCheckpoint,
            23 => Command::Revert,
            24 => Command::ListCheckpoints,
            25 => Command::RequestAccess,
            26 => Command::ViewRequests,
            27 => Command::ApproveRequest,
            28 => Command::DenyRequest,
            29 => Command::Heartbeat,
            _ => Command::Unknown,
        }
    }
}
