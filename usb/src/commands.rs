// Vendor request codes understood by the capture board's USB microcontroller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Request {
    MemReadBulk,
    MemWriteBulk,
    MemReadCtrl,
    MemWriteCtrl,
    FpgaStatus,
    FpgaProgram,
    FirmwareVersion,
    Usart0Data,
    Usart0Config,
}

impl Request {
    pub fn request_id(&self) -> u8 {
        match self {
            Request::MemReadBulk => 0x10,
            Request::MemWriteBulk => 0x11,
            Request::MemReadCtrl => 0x12,
            Request::MemWriteCtrl => 0x13,
            Request::FpgaStatus => 0x15,
            Request::FpgaProgram => 0x16,
            Request::FirmwareVersion => 0x17,
            Request::Usart0Data => 0x1a,
            Request::Usart0Config => 0x1b,
        }
    }
}

// Sent as the `value` of a FpgaProgram request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FpgaProgramCommand {
    Erase,
    Arm,
    Exit,
}

impl FpgaProgramCommand {
    pub fn value(&self) -> u16 {
        match self {
            FpgaProgramCommand::Erase => 0xa0,
            FpgaProgramCommand::Arm => 0xa1,
            FpgaProgramCommand::Exit => 0xa2,
        }
    }
}

// Sent as the `value` of a Usart0Config request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UsartCommand {
    Init,
    Enable,
    BytesWaiting,
}

impl UsartCommand {
    pub fn value(&self) -> u16 {
        match self {
            UsartCommand::Init => 0x10,
            UsartCommand::Enable => 0x11,
            UsartCommand::BytesWaiting => 0x14,
        }
    }
}
