use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use fxhash::FxHashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use super::constants::*;
use super::error::{BankError, MidasEventError, MidasFileError};

// MIDAS bank type ids
pub const TID_WORD: u32 = 4;
pub const TID_SHORT: u32 = 5;
pub const TID_DWORD: u32 = 6;
pub const TID_INT: u32 = 7;

// # MIDAS files
// A .mid file is a plain sequence of events. Each event is a 16 byte header followed by
// a bank header and a list of named banks. All values are little endian.

/// The fixed header at the start of every MIDAS event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventHeader {
    pub event_id: u16,
    pub trigger_mask: u16,
    pub serial_number: u32,
    pub timestamp: u32,
    pub data_size: u32,
}

impl EventHeader {
    pub fn read_from_buffer(cursor: &mut Cursor<&[u8]>) -> Result<Self, MidasEventError> {
        Ok(Self {
            event_id: cursor.read_u16::<LittleEndian>()?,
            trigger_mask: cursor.read_u16::<LittleEndian>()?,
            serial_number: cursor.read_u32::<LittleEndian>()?,
            timestamp: cursor.read_u32::<LittleEndian>()?,
            data_size: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn is_begin_of_run(&self) -> bool {
        self.event_id == EVENT_ID_BEGIN_OF_RUN
    }

    pub fn is_end_of_run(&self) -> bool {
        self.event_id == EVENT_ID_END_OF_RUN
    }

    /// Begin/end of run ODB dumps and message events carry no banks
    pub fn is_special(&self) -> bool {
        matches!(
            self.event_id,
            EVENT_ID_BEGIN_OF_RUN | EVENT_ID_END_OF_RUN | EVENT_ID_MESSAGE
        )
    }

    /// Event time; None if the timestamp is out of range
    pub fn datetime(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.timestamp as i64).ok()
    }
}

/// A named bank of raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    pub name: String,
    pub bank_type: u32,
    pub data: Vec<u8>,
}

impl Bank {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read the bank as 32-bit words
    pub fn to_u32_words(&self) -> Result<Vec<u32>, BankError> {
        let expected = "32-bit words";
        if !matches!(self.bank_type, TID_DWORD | TID_INT) {
            return Err(BankError::WrongType {
                name: self.name.clone(),
                expected,
                found: self.bank_type,
            });
        }
        if self.data.len() % 4 != 0 {
            return Err(BankError::BadLength {
                name: self.name.clone(),
                expected,
                length: self.data.len(),
            });
        }
        let mut words = vec![0u32; self.data.len() / 4];
        LittleEndian::read_u32_into(&self.data, &mut words);
        Ok(words)
    }

    /// Read the bank as 16-bit words
    pub fn to_u16_words(&self) -> Result<Vec<u16>, BankError> {
        let expected = "16-bit words";
        if !matches!(self.bank_type, TID_WORD | TID_SHORT) {
            return Err(BankError::WrongType {
                name: self.name.clone(),
                expected,
                found: self.bank_type,
            });
        }
        if self.data.len() % 2 != 0 {
            return Err(BankError::BadLength {
                name: self.name.clone(),
                expected,
                length: self.data.len(),
            });
        }
        let mut words = vec![0u16; self.data.len() / 2];
        LittleEndian::read_u16_into(&self.data, &mut words);
        Ok(words)
    }
}

/// Anything that can look up a bank by its four character name
pub trait BankSource {
    fn find_bank(&self, name: &str) -> Option<&Bank>;
}

/// A single MIDAS event with its banks
#[derive(Debug, Clone, Default)]
pub struct MidasEvent {
    pub header: EventHeader,
    banks: FxHashMap<String, Bank>,
}

impl BankSource for MidasEvent {
    fn find_bank(&self, name: &str) -> Option<&Bank> {
        self.banks.get(name)
    }
}

impl TryFrom<Vec<u8>> for MidasEvent {
    type Error = MidasEventError;

    fn try_from(buffer: Vec<u8>) -> Result<Self, Self::Error> {
        if buffer.len() < EVENT_HEADER_SIZE {
            return Err(MidasEventError::BufferTooSmall(buffer.len()));
        }
        let mut cursor = Cursor::new(buffer.as_slice());
        let header = EventHeader::read_from_buffer(&mut cursor)?;
        let mut event = MidasEvent {
            header,
            banks: FxHashMap::default(),
        };
        if event.header.is_special() || (event.header.data_size as usize) < BANK_HEADER_SIZE {
            return Ok(event);
        }

        let all_bank_size = cursor.read_u32::<LittleEndian>()? as usize;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let banks_end = (EVENT_HEADER_SIZE + BANK_HEADER_SIZE)
            .saturating_add(all_bank_size)
            .min(buffer.len());

        let bank_header_len = if flags & BANK_FLAG_32A != 0 {
            BANK32A_RECORD_HEADER_SIZE
        } else if flags & BANK_FLAG_32 != 0 {
            BANK32_RECORD_HEADER_SIZE
        } else {
            BANK16_RECORD_HEADER_SIZE
        };
        // Slack shorter than a bank header at the end of the bank area is ignored
        while (cursor.position() as usize) + bank_header_len <= banks_end {
            let mut name_bytes = [0u8; 4];
            cursor.read_exact(&mut name_bytes)?;
            let name = String::from_utf8_lossy(&name_bytes).to_string();
            let (bank_type, size) = if flags & BANK_FLAG_32A != 0 {
                let bank_type = cursor.read_u32::<LittleEndian>()?;
                let size = cursor.read_u32::<LittleEndian>()?;
                cursor.read_u32::<LittleEndian>()?; // reserved
                (bank_type, size as usize)
            } else if flags & BANK_FLAG_32 != 0 {
                let bank_type = cursor.read_u32::<LittleEndian>()?;
                let size = cursor.read_u32::<LittleEndian>()?;
                (bank_type, size as usize)
            } else {
                let bank_type = cursor.read_u16::<LittleEndian>()? as u32;
                let size = cursor.read_u16::<LittleEndian>()? as usize;
                (bank_type, size)
            };

            let start = cursor.position() as usize;
            let end = start.saturating_add(size);
            if end > banks_end {
                return Err(MidasEventError::BankOverrun(name));
            }
            let data = buffer[start..end].to_vec();
            // Banks are padded to 8 bytes
            let padded = size.div_ceil(BANK_ALIGNMENT) * BANK_ALIGNMENT;
            cursor.set_position((start + padded) as u64);

            event.banks.insert(
                name.clone(),
                Bank {
                    name,
                    bank_type,
                    data,
                },
            );
        }

        Ok(event)
    }
}

impl MidasEvent {
    /// Names of all banks in the event, sorted
    pub fn bank_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.banks.keys().map(|name| name.as_str()).collect();
        names.sort();
        names
    }
}

/// # MidasFile
/// Sequential reader over the events of an uncompressed .mid file
#[allow(dead_code)]
#[derive(Debug)]
pub struct MidasFile {
    file_handle: File,
    file_path: PathBuf,
    size_bytes: u64,
    bytes_read: u64,
    is_eof: bool,
}

impl MidasFile {
    /// Open a MIDAS file in read-only mode.
    pub fn new(path: &Path) -> Result<Self, MidasFileError> {
        if !path.exists() {
            return Err(MidasFileError::BadFilePath(path.to_path_buf()));
        }

        let mut file = File::open(path)?;
        let size_bytes = file.metadata()?.len();
        let mut magic = [0u8; 2];
        if size_bytes >= 2 {
            file.read_exact(&mut magic)?;
            if magic == GZIP_MAGIC {
                return Err(MidasFileError::CompressedFile(path.to_path_buf()));
            }
            file.seek(SeekFrom::Start(0))?;
        }

        Ok(MidasFile {
            file_handle: file,
            file_path: path.to_path_buf(),
            size_bytes,
            bytes_read: 0,
            is_eof: size_bytes == 0,
        })
    }

    /// Retrieve the next event from the file
    pub fn get_next_event(&mut self) -> Result<MidasEvent, MidasFileError> {
        let mut header_bytes = vec![0u8; EVENT_HEADER_SIZE];
        self.read_or_eof(&mut header_bytes)?;
        let data_size = LittleEndian::read_u32(&header_bytes[12..16]) as usize;

        let mut buffer = header_bytes;
        buffer.reserve(data_size);
        let found = (&mut self.file_handle)
            .take(data_size as u64)
            .read_to_end(&mut buffer)?;
        if found < data_size {
            self.is_eof = true;
            return Err(MidasFileError::TruncatedEvent {
                expected: data_size,
                found,
            });
        }
        self.bytes_read += buffer.len() as u64;

        Ok(MidasEvent::try_from(buffer)?)
    }

    fn read_or_eof(&mut self, buffer: &mut [u8]) -> Result<(), MidasFileError> {
        match self.file_handle.read_exact(buffer) {
            Err(e) => match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    self.is_eof = true;
                    Err(MidasFileError::EndOfFile)
                }
                _ => Err(MidasFileError::IOError(e)),
            },
            Ok(()) => Ok(()),
        }
    }

    pub fn is_eof(&self) -> bool {
        self.is_eof
    }

    pub fn get_filename(&self) -> &Path {
        &self.file_path
    }

    pub fn get_size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn get_bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    const TID_BYTE: u32 = 1;

    /// Encode an event with 32-bit bank headers
    pub(crate) fn encode_event(event_id: u16, serial: u32, banks: &[(&str, u32, Vec<u8>)]) -> Vec<u8> {
        encode_event_with_flags(event_id, serial, BANK_FLAG_32 | 1, banks)
    }

    pub(crate) fn encode_event_with_flags(
        event_id: u16,
        serial: u32,
        flags: u32,
        banks: &[(&str, u32, Vec<u8>)],
    ) -> Vec<u8> {
        let mut bank_area: Vec<u8> = Vec::new();
        for (name, bank_type, data) in banks {
            bank_area.write_all(&name.as_bytes()[..4]).unwrap();
            if flags & (BANK_FLAG_32 | BANK_FLAG_32A) != 0 {
                bank_area.write_u32::<LittleEndian>(*bank_type).unwrap();
                bank_area.write_u32::<LittleEndian>(data.len() as u32).unwrap();
                if flags & BANK_FLAG_32A != 0 {
                    bank_area.write_u32::<LittleEndian>(0).unwrap();
                }
            } else {
                bank_area.write_u16::<LittleEndian>(*bank_type as u16).unwrap();
                bank_area.write_u16::<LittleEndian>(data.len() as u16).unwrap();
            }
            bank_area.write_all(data).unwrap();
            // Only the payload is padded, the bank header is not
            let padding = data.len().div_ceil(BANK_ALIGNMENT) * BANK_ALIGNMENT - data.len();
            bank_area.extend(std::iter::repeat(0u8).take(padding));
        }

        let mut event: Vec<u8> = Vec::new();
        event.write_u16::<LittleEndian>(event_id).unwrap();
        event.write_u16::<LittleEndian>(1).unwrap();
        event.write_u32::<LittleEndian>(serial).unwrap();
        event.write_u32::<LittleEndian>(1_700_000_000).unwrap();
        event
            .write_u32::<LittleEndian>((bank_area.len() + BANK_HEADER_SIZE) as u32)
            .unwrap();
        event.write_u32::<LittleEndian>(bank_area.len() as u32).unwrap();
        event.write_u32::<LittleEndian>(flags).unwrap();
        event.extend(bank_area);
        event
    }

    pub(crate) fn u32_bytes(words: &[u32]) -> Vec<u8> {
        let mut bytes = vec![0u8; words.len() * 4];
        LittleEndian::write_u32_into(words, &mut bytes);
        bytes
    }

    pub(crate) fn u16_bytes(words: &[u16]) -> Vec<u8> {
        let mut bytes = vec![0u8; words.len() * 2];
        LittleEndian::write_u16_into(words, &mut bytes);
        bytes
    }

    #[test]
    fn test_parse_32bit_banks() {
        let buffer = encode_event(
            1,
            42,
            &[
                ("DGH0", TID_DWORD, u32_bytes(&[1, 2, 3])),
                ("DIG0", TID_WORD, u16_bytes(&[7, 8, 9])),
            ],
        );
        let event = MidasEvent::try_from(buffer).unwrap();
        assert_eq!(event.header.serial_number, 42);
        assert_eq!(event.bank_names(), vec!["DGH0", "DIG0"]);
        let header_bank = event.find_bank("DGH0").unwrap();
        assert_eq!(header_bank.len(), 12);
        assert_eq!(header_bank.to_u32_words().unwrap(), vec![1, 2, 3]);
        assert_eq!(
            event.find_bank("DIG0").unwrap().to_u16_words().unwrap(),
            vec![7, 8, 9]
        );
        assert!(event.find_bank("CAM0").is_none());
        assert_eq!(event.header.datetime().unwrap().year(), 2023);
    }

    #[test]
    fn test_parse_16bit_and_aligned_banks() {
        for flags in [1, BANK_FLAG_32A | BANK_FLAG_32 | 1] {
            let buffer = encode_event_with_flags(
                1,
                0,
                flags,
                &[
                    ("AAAA", TID_WORD, u16_bytes(&[1])),
                    ("BBBB", TID_INT, u32_bytes(&[5, 6])),
                ],
            );
            let event = MidasEvent::try_from(buffer).unwrap();
            assert_eq!(event.find_bank("AAAA").unwrap().to_u16_words().unwrap(), vec![1]);
            assert_eq!(
                event.find_bank("BBBB").unwrap().to_u32_words().unwrap(),
                vec![5, 6]
            );
        }
    }

    #[test]
    fn test_bank_type_checks() {
        let bank = Bank {
            name: String::from("DGH0"),
            bank_type: TID_WORD,
            data: vec![0; 6],
        };
        assert!(matches!(
            bank.to_u32_words(),
            Err(BankError::WrongType { found: TID_WORD, .. })
        ));
        let odd = Bank {
            name: String::from("DIG0"),
            bank_type: TID_WORD,
            data: vec![0; 5],
        };
        assert!(matches!(
            odd.to_u16_words(),
            Err(BankError::BadLength { length: 5, .. })
        ));
    }

    #[test]
    fn test_special_and_short_events() {
        let bor = encode_event(EVENT_ID_BEGIN_OF_RUN, 0, &[]);
        let event = MidasEvent::try_from(bor).unwrap();
        assert!(event.header.is_begin_of_run());
        assert!(event.bank_names().is_empty());

        assert!(matches!(
            MidasEvent::try_from(vec![0u8; 10]),
            Err(MidasEventError::BufferTooSmall(10))
        ));
    }

    #[test]
    fn test_bank_overrun() {
        let mut buffer = encode_event(1, 0, &[("DGH0", TID_DWORD, u32_bytes(&[1, 2]))]);
        // Claim a larger payload than the event holds
        buffer[EVENT_HEADER_SIZE + BANK_HEADER_SIZE + 8] = 64;
        assert!(matches!(
            MidasEvent::try_from(buffer),
            Err(MidasEventError::BankOverrun(_))
        ));
    }

    #[test]
    fn test_unaligned_32bit_payload() {
        // A 5 byte payload pads to 8, so the second bank header starts 12 + 8 bytes in
        let buffer = encode_event(
            1,
            0,
            &[
                ("AAAA", TID_BYTE, vec![1, 2, 3, 4, 5]),
                ("BBBB", TID_DWORD, u32_bytes(&[0xdead_beef])),
            ],
        );
        let bank_area = &buffer[EVENT_HEADER_SIZE + BANK_HEADER_SIZE..];
        assert_eq!(&bank_area[BANK32_RECORD_HEADER_SIZE + 8..][..4], b"BBBB");

        let event = MidasEvent::try_from(buffer).unwrap();
        assert_eq!(event.find_bank("AAAA").unwrap().data, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            event.find_bank("BBBB").unwrap().to_u32_words().unwrap(),
            vec![0xdead_beef]
        );
    }

    #[test]
    fn test_trailing_slack_ignored() {
        let mut buffer = encode_event(1, 0, &[("DGH0", TID_DWORD, u32_bytes(&[1, 2]))]);
        // Grow the bank area and the event by 4 bytes of slack
        let all_bank_size = LittleEndian::read_u32(&buffer[16..20]) + 4;
        LittleEndian::write_u32(&mut buffer[16..20], all_bank_size);
        let data_size = LittleEndian::read_u32(&buffer[12..16]) + 4;
        LittleEndian::write_u32(&mut buffer[12..16], data_size);
        buffer.extend([0u8; 4]);

        let event = MidasEvent::try_from(buffer).unwrap();
        assert_eq!(event.bank_names(), vec!["DGH0"]);
        assert_eq!(
            event.find_bank("DGH0").unwrap().to_u32_words().unwrap(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_truncated_final_event() {
        let path = std::env::temp_dir().join(format!("cygno_pmt_trunc_{}.mid", std::process::id()));
        let mut bytes = encode_event(1, 1, &[("DGH0", TID_DWORD, u32_bytes(&[9]))]);
        let last = encode_event(1, 2, &[("DGH0", TID_DWORD, u32_bytes(&[1, 2, 3, 4]))]);
        let full_size = last.len() - EVENT_HEADER_SIZE;
        bytes.extend(&last[..last.len() - 6]);
        std::fs::write(&path, &bytes).unwrap();

        let mut file = MidasFile::new(&path).unwrap();
        assert!(file.get_next_event().is_ok());
        match file.get_next_event() {
            Err(MidasFileError::TruncatedEvent { expected, found }) => {
                assert_eq!(expected, full_size);
                assert_eq!(found, full_size - 6);
            }
            other => panic!("expected a truncated event, got {other:?}"),
        }
        assert!(file.is_eof());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_midas_file() {
        let path = std::env::temp_dir().join(format!("cygno_pmt_midas_{}.mid", std::process::id()));
        let mut bytes = encode_event(EVENT_ID_BEGIN_OF_RUN, 0, &[]);
        bytes.extend(encode_event(1, 1, &[("DGH0", TID_DWORD, u32_bytes(&[9]))]));
        std::fs::write(&path, &bytes).unwrap();

        let mut file = MidasFile::new(&path).unwrap();
        assert_eq!(file.get_size_bytes(), bytes.len() as u64);
        assert!(file.get_next_event().unwrap().header.is_begin_of_run());
        let event = file.get_next_event().unwrap();
        assert_eq!(event.find_bank("DGH0").unwrap().to_u32_words().unwrap(), vec![9]);
        assert_eq!(file.get_bytes_read(), bytes.len() as u64);
        assert!(matches!(file.get_next_event(), Err(MidasFileError::EndOfFile)));
        assert!(file.is_eof());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_compressed_file_rejected() {
        let path = std::env::temp_dir().join(format!("cygno_pmt_gz_{}.mid.gz", std::process::id()));
        std::fs::write(&path, [0x1f, 0x8b, 0x08, 0x00]).unwrap();
        assert!(matches!(
            MidasFile::new(&path),
            Err(MidasFileError::CompressedFile(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }
}
