//! In-memory tabular message log.
//!
//! An [`ObservationTable`] keeps every cell of the source file as text so
//! that columns the detectors do not understand are carried through to the
//! output unchanged. Detectors read typed columns through the accessors
//! below and append their own columns.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::TableError;
use crate::types::Vec3;

/// Column names of the VeReMi tabular export.
pub mod columns {
    pub const SENDER: &str = "sender";
    pub const RECEIVER: &str = "receiver";
    pub const SEND_TIME: &str = "sendTime";
    pub const RCV_TIME: &str = "rcvTime";
    pub const MESSAGE_ID: &str = "messageID";
    pub const ATTACKER_TYPE: &str = "attackerType";
    pub const SENDER_POSITION: [&str; 3] = ["pxSnd", "pySnd", "pzSnd"];
    pub const SENDER_SPEED: [&str; 3] = ["sxSnd", "sySnd", "szSnd"];
    pub const RECEIVER_POSITION: [&str; 3] = ["pxRcv", "pyRcv", "pzRcv"];
}

/// One received message.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Observation {
    pub sender: i64,
    pub receiver: i64,
    pub send_time: f64,
    pub rcv_time: f64,
    pub sender_position: Vec3,
    pub sender_speed: Vec3,
    pub receiver_position: Vec3,
    pub message_id: i64,
    /// 0 for honest senders, otherwise the attack bit flag (1, 2, 4, 8, 16).
    pub attacker_type: i64,
}

impl Observation {
    pub fn is_attacker(&self) -> bool {
        self.attacker_type != 0
    }
}

/// Rows of one simulation file in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ObservationTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Load a delimited file with a header line.
    pub fn read_csv(path: impl AsRef<Path>, delimiter: u8) -> Result<Self, TableError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file), delimiter)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, TableError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);

        let columns = rdr.headers()?.iter().map(str::to_string).collect();
        let mut table = Self::new(columns);
        for record in rdr.records() {
            let record = record?;
            table.rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    pub fn write_csv(&self, path: impl AsRef<Path>, delimiter: u8) -> Result<(), TableError> {
        let file = File::create(path.as_ref())?;
        self.to_writer(BufWriter::new(file), delimiter)
    }

    pub fn to_writer<W: Write>(&self, writer: W, delimiter: u8) -> Result<(), TableError> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Build a table with the canonical VeReMi columns.
    pub fn from_observations(observations: &[Observation]) -> Self {
        let mut cols = vec![
            columns::SENDER,
            columns::RECEIVER,
            columns::SEND_TIME,
            columns::RCV_TIME,
        ];
        cols.extend(columns::SENDER_POSITION);
        cols.extend(columns::SENDER_SPEED);
        cols.extend(columns::RECEIVER_POSITION);
        cols.extend([columns::MESSAGE_ID, columns::ATTACKER_TYPE]);

        let mut table = Self::new(cols.into_iter().map(str::to_string).collect());
        for o in observations {
            let v3 = |v: Vec3| [v.x.to_string(), v.y.to_string(), v.z.to_string()];
            let mut row = vec![
                o.sender.to_string(),
                o.receiver.to_string(),
                o.send_time.to_string(),
                o.rcv_time.to_string(),
            ];
            row.extend(v3(o.sender_position));
            row.extend(v3(o.sender_speed));
            row.extend(v3(o.receiver_position));
            row.push(o.message_id.to_string());
            row.push(o.attacker_type.to_string());
            table.rows.push(row);
        }
        table
    }

    /// Parse every row into an [`Observation`]; requires all canonical columns.
    pub fn observations(&self) -> Result<Vec<Observation>, TableError> {
        let sender = self.id_column(columns::SENDER)?;
        let receiver = self.id_column(columns::RECEIVER)?;
        let send_time = self.f64_column(columns::SEND_TIME)?;
        let rcv_time = self.f64_column(columns::RCV_TIME)?;
        let sender_position = self.vec3_column(columns::SENDER_POSITION)?;
        let sender_speed = self.vec3_column(columns::SENDER_SPEED)?;
        let receiver_position = self.vec3_column(columns::RECEIVER_POSITION)?;
        let message_id = self.id_column(columns::MESSAGE_ID)?;
        let attacker_type = self.id_column(columns::ATTACKER_TYPE)?;

        Ok((0..self.len())
            .map(|i| Observation {
                sender: sender[i],
                receiver: receiver[i],
                send_time: send_time[i],
                rcv_time: rcv_time[i],
                sender_position: sender_position[i],
                sender_speed: sender_speed[i],
                receiver_position: receiver_position[i],
                message_id: message_id[i],
                attacker_type: attacker_type[i],
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column).ok()?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Raw text of one column.
    pub fn text_column(&self, name: &str) -> Result<Vec<&str>, TableError> {
        let col = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r[col].as_str()).collect())
    }

    pub fn f64_column(&self, name: &str) -> Result<Vec<f64>, TableError> {
        let col = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| parse_f64(&r[col]).ok_or_else(|| malformed(name, i, &r[col])))
            .collect()
    }

    /// Integer column; accepts `7` as well as `7.0`.
    pub fn id_column(&self, name: &str) -> Result<Vec<i64>, TableError> {
        let col = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| parse_int(&r[col]).ok_or_else(|| malformed(name, i, &r[col])))
            .collect()
    }

    pub fn vec3_column(&self, names: [&str; 3]) -> Result<Vec<Vec3>, TableError> {
        let x = self.f64_column(names[0])?;
        let y = self.f64_column(names[1])?;
        let z = self.f64_column(names[2])?;
        Ok(x
            .into_iter()
            .zip(y)
            .zip(z)
            .map(|((x, y), z)| Vec3::new(x, y, z))
            .collect())
    }

    /// Ground truth per row: any nonzero attacker code is an attacker.
    pub fn attacker_flags(&self) -> Result<Vec<bool>, TableError> {
        Ok(self
            .id_column(columns::ATTACKER_TYPE)?
            .into_iter()
            .map(|code| code != 0)
            .collect())
    }

    /// Append a column. Existing columns are never replaced.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<String>,
    ) -> Result<(), TableError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(TableError::DuplicateColumn(name));
        }
        if values.len() != self.rows.len() {
            return Err(TableError::LengthMismatch {
                column: name,
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Remove the named columns; names not present are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.contains(&c.as_str()))
            .collect();
        let retain = |cells: &mut Vec<String>| {
            let mut it = keep.iter();
            cells.retain(|_| *it.next().unwrap_or(&true));
        };
        retain(&mut self.columns);
        for row in &mut self.rows {
            retain(row);
        }
    }

    /// Rearrange rows so that row `i` becomes the old row `order[i]`.
    ///
    /// `order` must be a permutation of `0..len()`.
    pub fn reorder(&mut self, order: &[usize]) {
        debug_assert_eq!(order.len(), self.rows.len());
        let mut old: Vec<Option<Vec<String>>> = self.rows.drain(..).map(Some).collect();
        self.rows = order
            .iter()
            .filter_map(|&i| old.get_mut(i).and_then(Option::take))
            .collect();
    }
}

fn malformed(column: &str, row: usize, value: &str) -> TableError {
    TableError::Malformed {
        column: column.to_string(),
        row,
        value: value.to_string(),
    }
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>().ok().or_else(|| {
        let v = s.parse::<f64>().ok()?;
        (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
,sender,receiver,rcvTime,pxSnd,pySnd,pzSnd,attackerType
0,13,7,10.5,1.0,2.0,0.0,0
1,49.0,7,11.0,3.0,4.0,0.0,1.0
";

    #[test]
    fn test_read_preserves_unknown_columns() {
        let table = ObservationTable::from_reader(SAMPLE.as_bytes(), b',').unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns()[0], "");
        assert_eq!(table.value(1, "sender"), Some("49.0"));
        assert_eq!(table.id_column("sender").unwrap(), vec![13, 49]);
        assert_eq!(table.attacker_flags().unwrap(), vec![false, true]);
    }

    #[test]
    fn test_missing_and_malformed_columns() {
        let table = ObservationTable::from_reader(SAMPLE.as_bytes(), b',').unwrap();
        assert!(matches!(
            table.f64_column("pxRcv"),
            Err(TableError::MissingColumn(c)) if c == "pxRcv"
        ));

        let bad = "sender,rcvTime\n1,abc\n";
        let table = ObservationTable::from_reader(bad.as_bytes(), b',').unwrap();
        assert!(matches!(
            table.f64_column("rcvTime"),
            Err(TableError::Malformed { row: 0, .. })
        ));
    }

    #[test]
    fn test_ragged_rows_fail_to_load() {
        let ragged = "a,b\n1,2\n3\n";
        assert!(ObservationTable::from_reader(ragged.as_bytes(), b',').is_err());
    }

    #[test]
    fn test_push_drop_and_reorder() {
        let mut table = ObservationTable::from_reader(SAMPLE.as_bytes(), b',').unwrap();
        table
            .push_column("flag", vec!["a".into(), "b".into()])
            .unwrap();
        assert!(table.push_column("short", vec!["x".into()]).is_err());

        assert!(matches!(
            table.push_column("flag", vec!["c".into(), "d".into()]),
            Err(TableError::DuplicateColumn(ref c)) if c == "flag"
        ));
        assert_eq!(table.text_column("flag").unwrap(), vec!["a", "b"]);

        table.drop_columns(&["pxSnd", "pySnd", "nope"]);
        assert!(!table.has_column("pxSnd"));
        assert!(table.has_column("pzSnd"));

        table.reorder(&[1, 0]);
        assert_eq!(table.value(0, "flag"), Some("b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_observation_round_trip_through_csv() {
        let obs = Observation {
            sender: 3,
            receiver: 9,
            send_time: 1.25,
            rcv_time: 1.5,
            sender_position: Vec3::new(10.0, 20.0, 0.0),
            sender_speed: Vec3::new(1.0, -1.0, 0.0),
            receiver_position: Vec3::new(0.0, 0.0, 0.0),
            message_id: 42,
            attacker_type: 16,
        };
        let table = ObservationTable::from_observations(&[obs]);
        let mut buf = Vec::new();
        table.to_writer(&mut buf, b';').unwrap();

        let back = ObservationTable::from_reader(buf.as_slice(), b';').unwrap();
        let parsed = back.observations().unwrap();
        assert_eq!(parsed, vec![obs]);
        assert!(parsed[0].is_attacker());
    }
}
