//! Minimal independent reader for the emitted byte stream. Verifies the
//! node framing (end offsets, property list lengths, null records) while
//! reconstructing the tree the tests inspect.

use fbxport::writer::Data;

use std::mem::size_of;

pub const MAGIC: &[u8] = b"Kaydara FBX Binary  \x00\x1a\x00";

const SENTINEL_LEN: usize = 25;

#[derive(Debug, Clone, PartialEq)]
pub struct RNode {
    pub name: String,
    pub props: Vec<Data>,
    pub children: Vec<RNode>,
}

impl RNode {
    pub fn find(&self, name: &str) -> Option<&RNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Object id: first property of every record under `Objects`.
    pub fn id(&self) -> i64 {
        *self.props[0].as_i64().expect("object without id")
    }

    /// Name half of a `name\x00\x01Class` second property.
    pub fn obj_name(&self) -> &str {
        let full = self.props[1].as_str().expect("object without name");
        full.split_once('\u{0}').map_or(full, |(n, _)| n)
    }

    /// Class tag: third property of an object record.
    pub fn class_tag(&self) -> &str {
        self.props[2].as_str().expect("object without class tag")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conn {
    pub kind: String,
    pub src: i64,
    pub dst: i64,
    pub prop: Option<String>,
}

pub struct Doc {
    pub roots: Vec<RNode>,
}

impl Doc {
    pub fn parse(buf: &[u8]) -> Doc {
        assert_eq!(&buf[..MAGIC.len()], MAGIC, "magic mismatch");
        let version = u32::from_le_bytes(buf[MAGIC.len()..MAGIC.len() + 4].try_into().unwrap());
        assert_eq!(version, 7500);

        let mut rd = Rd {
            b: buf,
            at: MAGIC.len() + 4,
        };
        let mut roots = vec![];
        loop {
            let peek = u64::from_le_bytes(buf[rd.at..rd.at + 8].try_into().unwrap());
            if peek == 0 {
                rd.take(SENTINEL_LEN);
                break;
            }
            roots.push(read_node(&mut rd));
        }
        Doc { roots }
    }

    pub fn find(&self, name: &str) -> &RNode {
        self.roots
            .iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("missing root node {name:?}"))
    }

    pub fn objects(&self) -> &RNode {
        self.find("Objects")
    }

    pub fn connections(&self) -> Vec<Conn> {
        self.find("Connections")
            .all("C")
            .map(|c| Conn {
                kind: c.props[0].as_str().unwrap().to_string(),
                src: *c.props[1].as_i64().unwrap(),
                dst: *c.props[2].as_i64().unwrap(),
                prop: c.props.get(3).map(|p| p.as_str().unwrap().to_string()),
            })
            .collect()
    }

    /// The object record with the given node name and class tag.
    pub fn object<'a>(&'a self, record: &'a str, name: &str) -> &'a RNode {
        self.objects()
            .all(record)
            .find(|o| o.obj_name() == name)
            .unwrap_or_else(|| panic!("no {record} named {name:?}"))
    }
}

struct Rd<'a> {
    b: &'a [u8],
    at: usize,
}

macro_rules! get {
    ($fn_name: ident, $ty: ty) => {
        fn $fn_name(&mut self) -> $ty {
            let n = size_of::<$ty>();
            let v = <$ty>::from_le_bytes(self.b[self.at..self.at + n].try_into().unwrap());
            self.at += n;
            v
        }
    };
}

impl<'a> Rd<'a> {
    get!(u8, u8);
    get!(i16, i16);
    get!(u32, u32);
    get!(i32, i32);
    get!(u64, u64);
    get!(i64, i64);
    get!(f32, f32);
    get!(f64, f64);

    fn take(&mut self, n: usize) -> &'a [u8] {
        let out = &self.b[self.at..self.at + n];
        self.at += n;
        out
    }
}

macro_rules! read_arr {
    ($rd: expr, $get: ident) => {{
        let len = $rd.u32() as usize;
        let enc = $rd.u32();
        assert_eq!(enc, 0, "arrays are always uncompressed");
        let _byte_len = $rd.u32();
        (0..len).map(|_| $rd.$get()).collect()
    }};
}

fn read_prop(rd: &mut Rd) -> Data {
    match rd.u8() {
        b'C' => Data::Bool(rd.u8() == 1),
        b'Y' => Data::I16(rd.i16()),
        b'I' => Data::I32(rd.i32()),
        b'L' => Data::I64(rd.i64()),
        b'F' => Data::F32(rd.f32()),
        b'D' => Data::F64(rd.f64()),
        b'S' => {
            let len = rd.u32() as usize;
            Data::String(String::from_utf8(rd.take(len).to_vec()).unwrap())
        }
        b'R' => {
            let len = rd.u32() as usize;
            Data::Binary(rd.take(len).to_vec())
        }
        b'b' => {
            let len = rd.u32() as usize;
            let enc = rd.u32();
            assert_eq!(enc, 0);
            let _byte_len = rd.u32();
            Data::BoolArr((0..len).map(|_| rd.u8() == 1).collect())
        }
        b'i' => Data::I32Arr(read_arr!(rd, i32)),
        b'l' => Data::I64Arr(read_arr!(rd, i64)),
        b'f' => Data::F32Arr(read_arr!(rd, f32)),
        b'd' => Data::F64Arr(read_arr!(rd, f64)),
        t => panic!("unknown property tag {t:?} at {}", rd.at - 1),
    }
}

fn read_node(rd: &mut Rd) -> RNode {
    let end = rd.u64() as usize;
    let num_props = rd.u64() as usize;
    let prop_len = rd.u64() as usize;
    let name_len = rd.u8() as usize;
    let name = String::from_utf8(rd.take(name_len).to_vec()).unwrap();

    let prop_start = rd.at;
    let props = (0..num_props).map(|_| read_prop(rd)).collect();
    assert_eq!(
        rd.at - prop_start,
        prop_len,
        "property list length mismatch in {name:?}"
    );

    let mut children = vec![];
    if rd.at < end {
        while rd.at < end - SENTINEL_LEN {
            children.push(read_node(rd));
        }
        let sentinel = rd.take(SENTINEL_LEN);
        assert!(
            sentinel.iter().all(|&v| v == 0),
            "corrupt null record after {name:?}"
        );
    }
    assert_eq!(rd.at, end, "end offset mismatch in {name:?}");

    RNode {
        name,
        props,
        children,
    }
}
