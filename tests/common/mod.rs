//! Shared fixtures: a small class-file assembler and temp-dir layouts

#![allow(dead_code)]

use classshrink::classfile::{access, AttributeInfo, ClassFile, ConstantPool, MemberInfo};
use classshrink::discovery::ClassFileFinder;
use classshrink::shrinker::ShrinkInputs;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const OBJECT: &str = "java/lang/Object";

/// Bytecode used by the fixtures
#[derive(Debug, Clone)]
pub enum Op {
    Aload0,
    AconstNull,
    Iconst0,
    Dup,
    Pop,
    Return,
    Areturn,
    Ireturn,
    New(String),
    Ldc(String),
    GetStatic(String, String, String),
    GetField(String, String, String),
    PutField(String, String, String),
    InvokeVirtual(String, String, String),
    InvokeSpecial(String, String, String),
    InvokeStatic(String, String, String),
    InvokeInterface(String, String, String),
}

impl Op {
    pub fn new_object(class: &str) -> Self {
        Op::New(class.to_string())
    }

    pub fn virtual_call(owner: &str, name: &str, desc: &str) -> Self {
        Op::InvokeVirtual(owner.into(), name.into(), desc.into())
    }

    pub fn special_call(owner: &str, name: &str, desc: &str) -> Self {
        Op::InvokeSpecial(owner.into(), name.into(), desc.into())
    }

    pub fn static_call(owner: &str, name: &str, desc: &str) -> Self {
        Op::InvokeStatic(owner.into(), name.into(), desc.into())
    }

    pub fn interface_call(owner: &str, name: &str, desc: &str) -> Self {
        Op::InvokeInterface(owner.into(), name.into(), desc.into())
    }

    pub fn get_field(owner: &str, name: &str, desc: &str) -> Self {
        Op::GetField(owner.into(), name.into(), desc.into())
    }

    pub fn get_static(owner: &str, name: &str, desc: &str) -> Self {
        Op::GetStatic(owner.into(), name.into(), desc.into())
    }

    fn encode(&self, pool: &mut ConstantPool, code: &mut Vec<u8>) {
        fn indexed(opcode: u8, index: u16, code: &mut Vec<u8>) {
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
        }
        match self {
            Op::Aload0 => code.push(0x2a),
            Op::AconstNull => code.push(0x01),
            Op::Iconst0 => code.push(0x03),
            Op::Dup => code.push(0x59),
            Op::Pop => code.push(0x57),
            Op::Return => code.push(0xb1),
            Op::Areturn => code.push(0xb0),
            Op::Ireturn => code.push(0xac),
            Op::New(class) => indexed(0xbb, pool.intern_class(class).unwrap(), code),
            Op::Ldc(value) => {
                let index = pool.intern_string(value).unwrap();
                code.push(0x13);
                code.extend_from_slice(&index.to_be_bytes());
            }
            Op::GetStatic(o, n, d) => indexed(0xb2, pool.intern_field_ref(o, n, d).unwrap(), code),
            Op::GetField(o, n, d) => indexed(0xb4, pool.intern_field_ref(o, n, d).unwrap(), code),
            Op::PutField(o, n, d) => indexed(0xb5, pool.intern_field_ref(o, n, d).unwrap(), code),
            Op::InvokeVirtual(o, n, d) => indexed(0xb6, pool.intern_method_ref(o, n, d, false).unwrap(), code),
            Op::InvokeSpecial(o, n, d) => indexed(0xb7, pool.intern_method_ref(o, n, d, false).unwrap(), code),
            Op::InvokeStatic(o, n, d) => indexed(0xb8, pool.intern_method_ref(o, n, d, false).unwrap(), code),
            Op::InvokeInterface(o, n, d) => {
                indexed(0xb9, pool.intern_method_ref(o, n, d, true).unwrap(), code);
                code.push(1);
                code.push(0);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct MethodSpec {
    access: u16,
    name: String,
    descriptor: String,
    code: Option<Vec<Op>>,
}

/// Assembles one class file
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    access: u16,
    fields: Vec<(u16, String, String)>,
    methods: Vec<MethodSpec>,
    annotations: Vec<String>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some(OBJECT.to_string()),
            interfaces: Vec::new(),
            access: access::PUBLIC | access::SUPER,
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn interface(name: &str) -> Self {
        let mut builder = Self::new(name);
        builder.access = access::PUBLIC | access::INTERFACE | access::ABSTRACT;
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn annotated(mut self, annotation: &str) -> Self {
        self.annotations.push(annotation.to_string());
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.fields.push((access, name.to_string(), descriptor.to_string()));
        self
    }

    pub fn method(mut self, access: u16, name: &str, descriptor: &str, code: Vec<Op>) -> Self {
        self.methods.push(MethodSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: Some(code),
        });
        self
    }

    /// A method without a body (abstract or native)
    pub fn declare(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: None,
        });
        self
    }

    /// `public <init>()V` calling the superclass constructor
    pub fn default_constructor(self) -> Self {
        let parent = self.super_name.clone().unwrap_or_else(|| OBJECT.to_string());
        self.method(
            access::PUBLIC,
            "<init>",
            "()V",
            vec![Op::Aload0, Op::special_call(&parent, "<init>", "()V"), Op::Return],
        )
    }

    /// A `public void name()` that does nothing
    pub fn empty_method(self, name: &str) -> Self {
        self.method(access::PUBLIC, name, "()V", vec![Op::Return])
    }

    pub fn build(&self) -> ClassFile {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class(&self.name).unwrap();
        let super_class = match &self.super_name {
            Some(name) => pool.intern_class(name).unwrap(),
            None => 0,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|i| pool.intern_class(i).unwrap())
            .collect();

        let fields = self
            .fields
            .iter()
            .map(|(flags, name, desc)| MemberInfo {
                access_flags: *flags,
                name_index: pool.intern_utf8(name).unwrap(),
                descriptor_index: pool.intern_utf8(desc).unwrap(),
                attributes: Vec::new(),
            })
            .collect();

        let methods = self
            .methods
            .iter()
            .map(|method| {
                let name_index = pool.intern_utf8(&method.name).unwrap();
                let descriptor_index = pool.intern_utf8(&method.descriptor).unwrap();
                let attributes = match &method.code {
                    Some(ops) => vec![code_attribute(&mut pool, ops)],
                    None => Vec::new(),
                };
                MemberInfo {
                    access_flags: method.access,
                    name_index,
                    descriptor_index,
                    attributes,
                }
            })
            .collect();

        let mut attributes = Vec::new();
        if !self.annotations.is_empty() {
            let name_index = pool.intern_utf8("RuntimeVisibleAnnotations").unwrap();
            let mut data = Vec::new();
            data.extend_from_slice(&(self.annotations.len() as u16).to_be_bytes());
            for annotation in &self.annotations {
                let type_index = pool.intern_utf8(&format!("L{};", annotation)).unwrap();
                data.extend_from_slice(&type_index.to_be_bytes());
                data.extend_from_slice(&0u16.to_be_bytes());
            }
            attributes.push(AttributeInfo { name_index, data });
        }

        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: pool,
            access_flags: self.access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.build().to_bytes()
    }
}

fn code_attribute(pool: &mut ConstantPool, ops: &[Op]) -> AttributeInfo {
    let name_index = pool.intern_utf8("Code").unwrap();
    let mut code = Vec::new();
    for op in ops {
        op.encode(pool, &mut code);
    }
    let mut data = Vec::new();
    data.extend_from_slice(&4u16.to_be_bytes());
    data.extend_from_slice(&4u16.to_be_bytes());
    data.extend_from_slice(&(code.len() as u32).to_be_bytes());
    data.extend_from_slice(&code);
    data.extend_from_slice(&0u16.to_be_bytes());
    data.extend_from_slice(&0u16.to_be_bytes());
    AttributeInfo { name_index, data }
}

/// Write a class below `root` at its package path
pub fn write_class(root: &Path, class: &ClassBuilder) -> PathBuf {
    let path = root.join(format!("{}.class", class.name()));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, class.to_bytes()).unwrap();
    path
}

/// `static void main(String[])` running `ops` then returning
pub fn main_class(ops: Vec<Op>) -> ClassBuilder {
    let mut code = ops;
    code.push(Op::Return);
    ClassBuilder::new("com/example/Main")
        .default_constructor()
        .method(access::PUBLIC | access::STATIC, "main", "([Ljava/lang/String;)V", code)
}

/// `new Class()` with the result discarded
pub fn construct(class: &str) -> Vec<Op> {
    vec![
        Op::new_object(class),
        Op::Dup,
        Op::special_call(class, "<init>", "()V"),
        Op::Pop,
    ]
}

/// `Impl` implements `Greeter` through `Base.greet` without declaring it.
/// With `call`, main invokes `Greeter.greet` on a new `Impl`.
pub fn inherited_interface_method(ws: &Workspace, call: bool) {
    let mut main = construct("com/example/Impl");
    if call {
        main.insert(3, Op::interface_call("com/example/Greeter", "greet", "()V"));
        main.insert(3, Op::Dup);
    }
    ws.add_program(&main_class(main));
    ws.add_program(
        &ClassBuilder::interface("com/example/Greeter")
            .declare(access::PUBLIC | access::ABSTRACT, "greet", "()V"),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/Base")
            .default_constructor()
            .empty_method("greet"),
    );
    ws.add_program(
        &ClassBuilder::new("com/example/Impl")
            .extends("com/example/Base")
            .implements("com/example/Greeter")
            .default_constructor(),
    );
}

pub const KEEP_MAIN: &str =
    "-keep public class com.example.Main {\n    public static void main(java.lang.String[]);\n}\n";

/// Program, library, output and state directories under one temp dir
pub struct Workspace {
    pub temp: TempDir,
    pub program: PathBuf,
    pub library: PathBuf,
    pub output: PathBuf,
    pub state: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let program = temp.path().join("classes");
        let library = temp.path().join("libs");
        let output = temp.path().join("out");
        let state = temp.path().join("state");
        fs::create_dir_all(&program).unwrap();
        fs::create_dir_all(&library).unwrap();
        Self {
            temp,
            program,
            library,
            output,
            state,
        }
    }

    pub fn add_program(&self, class: &ClassBuilder) -> PathBuf {
        write_class(&self.program, class)
    }

    pub fn add_library(&self, class: &ClassBuilder) -> PathBuf {
        write_class(&self.library, class)
    }

    pub fn remove_program(&self, name: &str) {
        fs::remove_file(self.program.join(format!("{}.class", name))).unwrap();
    }

    pub fn inputs(&self) -> ShrinkInputs {
        let finder = ClassFileFinder::new();
        ShrinkInputs::new(
            finder.find_all(&[self.program.clone()]).unwrap(),
            finder.find_all(&[self.library.clone()]).unwrap(),
        )
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output.join(format!("{}.class", name))
    }

    /// The shrunk class, if it was written
    pub fn output_class(&self, name: &str) -> Option<ClassFile> {
        let bytes = fs::read(self.output_path(name)).ok()?;
        Some(ClassFile::parse(&bytes).unwrap())
    }

    /// Sorted `name.class` paths below the output directory
    pub fn output_files(&self) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(&self.output)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(&self.output)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }
}

/// `name:descriptor` ids of the methods of a class, sorted
pub fn method_ids(class: &ClassFile) -> Vec<String> {
    let mut ids: Vec<String> = class.methods.iter().map(|m| class.member_id(m).unwrap()).collect();
    ids.sort();
    ids
}

pub fn field_ids(class: &ClassFile) -> Vec<String> {
    let mut ids: Vec<String> = class.fields.iter().map(|m| class.member_id(m).unwrap()).collect();
    ids.sort();
    ids
}

/// `java/lang/Object` with the methods every class inherits
pub fn object_class() -> ClassBuilder {
    let mut object = ClassBuilder::new(OBJECT);
    object.super_name = None;
    object
        .method(access::PUBLIC, "<init>", "()V", vec![Op::Return])
        .method(access::PUBLIC, "toString", "()Ljava/lang/String;", vec![Op::AconstNull, Op::Areturn])
        .method(access::PUBLIC, "hashCode", "()I", vec![Op::Iconst0, Op::Ireturn])
        .method(access::PUBLIC, "equals", "(Ljava/lang/Object;)Z", vec![Op::Iconst0, Op::Ireturn])
}
