/// Top-level kind of a wire record (spec.md S6).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum MsgType {
    RegisterNode = 1,
    RegisterUser = 2,
    Command = 3,
    Response = 4,
    NodeCommand = 5,
}

impl MsgType {
    pub fn from_wire(value: u32) -> MsgType {
        match value {
            1 => MsgType::RegisterNode,
            2 => MsgType::RegisterUser,
            3 => MsgType::Command,
            4 => MsgType::Response,
            _ => MsgType::NodeCommand,
        }
    }
}
