pub(crate) use crate::boxes::HeifBox;
pub(crate) use crate::isobox::{BoxInfo, BoxReader, BoxWriter, FullBox, GenericBox};
pub(crate) use crate::serialize::{
    ArraySized16, ArraySized32, ArrayUnsized, BoxBytes, FromBytes, ReadBytes, ToBytes, WriteBytes,
};
pub(crate) use crate::types::*;
