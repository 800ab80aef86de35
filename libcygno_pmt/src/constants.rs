// Digitizer board models
pub const MODEL_V1742: u32 = 1742;
pub const MODEL_V1720: u32 = 1720;

// Header layout
pub const BOARD_COUNT_WORDS: usize = 1; // word 0 is the number of boards
pub const BOARD_FIXED_FIELDS: usize = 6; // model, nsamples, nchannels, nwaveforms, vres, srate
pub const MIN_HEADER_WORDS: usize = BOARD_COUNT_WORDS + BOARD_FIXED_FIELDS;

// DRS4 chip geometry (V1742 only)
pub const DRS4_NUMBER_OF_CELLS: usize = 1024;
pub const DRS4_NUMBER_OF_CHANNELS: usize = 8;

// Channel offsets in this band have valid DRS4 correction tables
pub const DRS4_OFFSET_BAND_LOW: f32 = -0.35; // inclusive
pub const DRS4_OFFSET_BAND_HIGH: f32 = -0.25; // exclusive

// Peak correction
pub const PEAK_JUMP_THRESHOLD: i32 = 30; // ADC counts
pub const PEAK_FLAT_THRESHOLD: i32 = 5; // ADC counts
pub const PEAK_MAJORITY: usize = 7; // out of DRS4_NUMBER_OF_CHANNELS
pub const PEAK_SUSTAINED_WINDOW: usize = 6; // samples i..i+5

// MIDAS container
pub const BANK_NAME_HEADER: &str = "DGH0";
pub const BANK_NAME_WAVEFORMS: &str = "DIG0";
pub const EVENT_HEADER_SIZE: usize = 16; // bytes
pub const BANK_HEADER_SIZE: usize = 8; // bytes
pub const BANK_ALIGNMENT: usize = 8; // bytes
pub const BANK16_RECORD_HEADER_SIZE: usize = 8; // name, u16 type, u16 size
pub const BANK32_RECORD_HEADER_SIZE: usize = 12; // name, u32 type, u32 size
pub const BANK32A_RECORD_HEADER_SIZE: usize = 16; // name, u32 type, u32 size, reserved
pub const EVENT_ID_BEGIN_OF_RUN: u16 = 0x8000;
pub const EVENT_ID_END_OF_RUN: u16 = 0x8001;
pub const EVENT_ID_MESSAGE: u16 = 0x8002;
pub const BANK_FLAG_32: u32 = 0x10;
pub const BANK_FLAG_32A: u32 = 0x20;
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
