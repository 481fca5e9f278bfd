//! Self-describing byte container: a header naming the schema, then datums.
//!
//! Layout: the 4-byte magic `CHL1`, a CBOR header `{schema, fingerprint}`,
//! then zero or more CBOR datums back to back. Writing or reading one
//! container is one session: IDs written in one datum may be referenced from
//! any later datum.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, DatumReader, DatumWriter};
use crate::conversion::DataModel;
use crate::schema::Schema;
use crate::value::Value;

pub const MAGIC: &[u8; 4] = b"CHL1";

#[derive(Serialize, Deserialize)]
struct Header {
    schema: Schema,
    fingerprint: blake3::Hash,
}

pub struct ContainerWriter<'m> {
    writer: DatumWriter<'m>,
    bytes: Vec<u8>,
    count: usize,
}

impl<'m> ContainerWriter<'m> {
    /// Starts a container for values of `schema`.
    pub fn new(model: &'m DataModel, schema: &'m Schema) -> Result<Self, CodecError> {
        let writer = DatumWriter::new(model, schema)?;
        let header = Header {
            schema: schema.clone(),
            fingerprint: schema.fingerprint()?,
        };

        let mut bytes = MAGIC.to_vec();
        ciborium::into_writer(&header, &mut bytes).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(ContainerWriter {
            writer,
            bytes,
            count: 0,
        })
    }

    pub fn append(&mut self, value: &Value) -> Result<(), CodecError> {
        let datum = self.writer.write(value)?;
        ciborium::into_writer(&datum, &mut self.bytes)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        self.count += 1;
        Ok(())
    }

    /// Number of values appended so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(self) -> Vec<u8> {
        debug!("finished container with {} value(s)", self.count);
        self.bytes
    }
}

/// A fully decoded container.
pub struct ContainerReader {
    schema: Schema,
    fingerprint: blake3::Hash,
    records: Vec<Value>,
}

impl ContainerReader {
    /// Decodes every datum in `bytes`, then asks `model` to report anything
    /// left unresolved.
    pub fn open(model: &DataModel, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut rest = bytes.strip_prefix(MAGIC.as_slice()).ok_or(CodecError::BadMagic)?;

        let header: Header =
            ciborium::from_reader(&mut rest).map_err(|e| CodecError::Decode(e.to_string()))?;
        let actual = header.schema.fingerprint()?;
        if actual != header.fingerprint {
            return Err(CodecError::FingerprintMismatch {
                expected: header.fingerprint,
                actual,
            });
        }

        let reader = DatumReader::new(model, &header.schema)?;
        let mut records = Vec::new();
        while !rest.is_empty() {
            let datum: ciborium::Value = ciborium::from_reader(&mut rest)
                .map_err(|e| CodecError::Decode(e.to_string()))?;
            records.push(reader.read(&datum)?);
        }
        model.end_read()?;
        debug!("read {} value(s) of schema {}", records.len(), header.fingerprint);

        Ok(ContainerReader {
            schema: header.schema,
            fingerprint: header.fingerprint,
            records,
        })
    }

    /// The writer's schema, taken from the header.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Blake3 hash of the schema's CBOR encoding.
    pub fn fingerprint(&self) -> blake3::Hash {
        self.fingerprint
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Value> {
        self.records
    }
}
