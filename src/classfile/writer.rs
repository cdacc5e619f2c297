use super::bytes::ByteWriter;
use super::reader::{AttributeInfo, ClassFile, MemberInfo};
use super::MAGIC;

impl ClassFile {
    /// Serialize the class file; parsing then writing yields identical bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.u32(MAGIC);
        writer.u16(self.minor_version);
        writer.u16(self.major_version);
        self.constant_pool.write(&mut writer);
        writer.u16(self.access_flags);
        writer.u16(self.this_class);
        writer.u16(self.super_class);

        writer.u16(self.interfaces.len() as u16);
        for interface in &self.interfaces {
            writer.u16(*interface);
        }

        write_members(&mut writer, &self.fields);
        write_members(&mut writer, &self.methods);
        write_attributes(&mut writer, &self.attributes);
        writer.into_inner()
    }
}

fn write_members(writer: &mut ByteWriter, members: &[MemberInfo]) {
    writer.u16(members.len() as u16);
    for member in members {
        writer.u16(member.access_flags);
        writer.u16(member.name_index);
        writer.u16(member.descriptor_index);
        write_attributes(writer, &member.attributes);
    }
}

pub(crate) fn write_attributes(writer: &mut ByteWriter, attributes: &[AttributeInfo]) {
    writer.u16(attributes.len() as u16);
    for attribute in attributes {
        writer.u16(attribute.name_index);
        writer.u32(attribute.data.len() as u32);
        writer.bytes(&attribute.data);
    }
}
