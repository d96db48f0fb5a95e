use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use thiserror::Error;

/// Problem input errors. Offsets are byte positions into the instance file so
/// a bad token can be located without re-tokenizing.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("could not read instance file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of input at byte {offset} (expected {expected})")]
    Truncated { offset: usize, expected: &'static str },
    #[error("bad token {token:?} at byte {offset} (expected {expected})")]
    BadToken {
        offset: usize,
        token: String,
        expected: &'static str,
    },
    #[error("item id {item} out of range at byte {offset} (instance has {num_items} items)")]
    ItemOutOfRange {
        offset: usize,
        item: usize,
        num_items: usize,
    },
    #[error("units must be >= 1 at byte {offset}")]
    ZeroUnits { offset: usize },
    #[error("wave bounds are inverted: LB {lb} > UB {ub}")]
    BadBounds { lb: u64, ub: u64 },
}

/// Aisle sets adjacent to each order and vice versa. Derived once from the
/// instance; immutable afterwards.
#[derive(Debug)]
pub struct Adjacency {
    /// order -> aisles whose stock intersects the order's demand set
    pub order_aisles: Vec<Vec<usize>>,
    /// aisle -> orders whose demand set intersects the aisle's stock
    pub aisle_orders: Vec<Vec<usize>>,
}

/// Immutable wave-picking problem data. Orders demand items, aisles stock
/// them, and a wave must pick a total unit count inside `[wave_lb, wave_ub]`.
#[derive(Debug)]
pub struct Instance {
    pub num_items: usize,
    /// order -> (item, demanded units), sorted by item id
    pub orders: Vec<Vec<(usize, u32)>>,
    /// aisle -> (item, stocked units), sorted by item id
    pub aisles: Vec<Vec<(usize, u32)>>,
    pub wave_lb: u64,
    pub wave_ub: u64,
    /// total demanded units per order
    pub order_units: Vec<u64>,
    /// item -> (order, slot) for every order demanding it, where `slot` is the
    /// index of that item inside `orders[order]`
    pub item_orders: Vec<Vec<(usize, usize)>>,
    /// item -> aisles stocking it with positive units
    pub item_aisles: Vec<Vec<usize>>,
    adjacency: OnceLock<Adjacency>,
}

impl Instance {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, InstanceError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Whitespace-tokenized reader; record boundaries are irrelevant.
    pub fn parse(text: &str) -> Result<Self, InstanceError> {
        let mut tok = Tokens::new(text);

        let num_orders = tok.next_usize("order count")?;
        let num_items = tok.next_usize("item count")?;
        let num_aisles = tok.next_usize("aisle count")?;

        let mut orders = Vec::with_capacity(num_orders);
        for _ in 0..num_orders {
            orders.push(tok.next_item_map(num_items, "order record")?);
        }

        let mut aisles = Vec::with_capacity(num_aisles);
        for _ in 0..num_aisles {
            aisles.push(tok.next_item_map(num_items, "aisle record")?);
        }

        let wave_lb = tok.next_u64("wave lower bound")?;
        let wave_ub = tok.next_u64("wave upper bound")?;
        if wave_lb > wave_ub {
            return Err(InstanceError::BadBounds {
                lb: wave_lb,
                ub: wave_ub,
            });
        }

        Ok(Self::from_parts(num_items, orders, aisles, wave_lb, wave_ub))
    }

    pub fn from_parts(
        num_items: usize,
        mut orders: Vec<Vec<(usize, u32)>>,
        mut aisles: Vec<Vec<(usize, u32)>>,
        wave_lb: u64,
        wave_ub: u64,
    ) -> Self {
        // stock lookups binary-search on item id
        for row in orders.iter_mut().chain(aisles.iter_mut()) {
            row.sort_unstable_by_key(|&(i, _)| i);
        }
        let order_units = orders
            .iter()
            .map(|o| o.iter().map(|&(_, u)| u64::from(u)).sum())
            .collect();

        let mut item_orders = vec![Vec::new(); num_items];
        for (o, demand) in orders.iter().enumerate() {
            for (slot, &(item, _)) in demand.iter().enumerate() {
                item_orders[item].push((o, slot));
            }
        }

        let mut item_aisles = vec![Vec::new(); num_items];
        for (a, stock) in aisles.iter().enumerate() {
            for &(item, _) in stock {
                item_aisles[item].push(a);
            }
        }

        Instance {
            num_items,
            orders,
            aisles,
            wave_lb,
            wave_ub,
            order_units,
            item_orders,
            item_aisles,
            adjacency: OnceLock::new(),
        }
    }

    pub fn num_orders(&self) -> usize {
        self.orders.len()
    }

    pub fn num_aisles(&self) -> usize {
        self.aisles.len()
    }

    /// Units of `item` stocked by `aisle`, if any.
    pub fn aisle_stock_of(&self, aisle: usize, item: usize) -> Option<u32> {
        let stock = &self.aisles[aisle];
        stock
            .binary_search_by_key(&item, |&(i, _)| i)
            .ok()
            .map(|idx| stock[idx].1)
    }

    pub fn aisle_stocks(&self, aisle: usize, item: usize) -> bool {
        self.aisle_stock_of(aisle, item).is_some()
    }

    /// The order/aisle adjacency maps, built on first use.
    pub fn adjacency(&self) -> &Adjacency {
        self.adjacency.get_or_init(|| {
            let mut order_aisles = vec![Vec::new(); self.num_orders()];
            let mut aisle_orders = vec![Vec::new(); self.num_aisles()];

            // stamp vectors avoid a HashSet per row
            let mut order_seen = vec![usize::MAX; self.num_orders()];
            for (a, stock) in self.aisles.iter().enumerate() {
                for &(item, _) in stock {
                    for &(o, _) in &self.item_orders[item] {
                        if order_seen[o] != a {
                            order_seen[o] = a;
                            order_aisles[o].push(a);
                            aisle_orders[a].push(o);
                        }
                    }
                }
            }
            for v in &mut order_aisles {
                v.sort_unstable();
            }

            Adjacency {
                order_aisles,
                aisle_orders,
            }
        })
    }
}

struct Tokens<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Tokens { text, pos: 0 }
    }

    fn next_token(&mut self, expected: &'static str) -> Result<(usize, &'a str), InstanceError> {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Err(InstanceError::Truncated {
                offset: self.pos,
                expected,
            });
        }
        let start = self.pos;
        while self.pos < bytes.len() && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        Ok((start, &self.text[start..self.pos]))
    }

    fn next_u64(&mut self, expected: &'static str) -> Result<u64, InstanceError> {
        let (offset, token) = self.next_token(expected)?;
        token.parse().map_err(|_| InstanceError::BadToken {
            offset,
            token: token.to_string(),
            expected,
        })
    }

    fn next_usize(&mut self, expected: &'static str) -> Result<usize, InstanceError> {
        let (offset, token) = self.next_token(expected)?;
        token.parse().map_err(|_| InstanceError::BadToken {
            offset,
            token: token.to_string(),
            expected,
        })
    }

    /// `k` followed by `k` pairs `(itemId units)`, returned sorted by item.
    fn next_item_map(
        &mut self,
        num_items: usize,
        expected: &'static str,
    ) -> Result<Vec<(usize, u32)>, InstanceError> {
        let k = self.next_usize(expected)?;
        let mut entries = Vec::with_capacity(k);
        for _ in 0..k {
            let (item_offset, item_token) = self.next_token("item id")?;
            let item: usize = item_token.parse().map_err(|_| InstanceError::BadToken {
                offset: item_offset,
                token: item_token.to_string(),
                expected: "item id",
            })?;
            if item >= num_items {
                return Err(InstanceError::ItemOutOfRange {
                    offset: item_offset,
                    item,
                    num_items,
                });
            }

            let (units_offset, units_token) = self.next_token("units")?;
            let units: u32 = units_token.parse().map_err(|_| InstanceError::BadToken {
                offset: units_offset,
                token: units_token.to_string(),
                expected: "units",
            })?;
            if units == 0 {
                return Err(InstanceError::ZeroUnits {
                    offset: units_offset,
                });
            }
            entries.push((item, units));
        }
        entries.sort_unstable_by_key(|&(i, _)| i);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_instance() {
        let text = "2 3 2\n2 0 3 2 1\n1 1 4\n2 0 5 1 5\n2 1 2 2 2\n3 12\n";
        let inst = Instance::parse(text).unwrap();
        assert_eq!(inst.num_orders(), 2);
        assert_eq!(inst.num_items, 3);
        assert_eq!(inst.num_aisles(), 2);
        assert_eq!(inst.orders[0], vec![(0, 3), (2, 1)]);
        assert_eq!(inst.orders[1], vec![(1, 4)]);
        assert_eq!(inst.order_units, vec![4, 4]);
        assert_eq!(inst.wave_lb, 3);
        assert_eq!(inst.wave_ub, 12);
        assert!(inst.aisle_stocks(0, 0));
        assert!(!inst.aisle_stocks(0, 2));
        assert_eq!(inst.aisle_stock_of(1, 2), Some(2));
    }

    #[test]
    fn tokenization_ignores_line_structure() {
        let flat = "1 1 1 1 0 3 1 0 5 3 3";
        let inst = Instance::parse(flat).unwrap();
        assert_eq!(inst.num_orders(), 1);
        assert_eq!(inst.orders[0], vec![(0, 3)]);
        assert_eq!(inst.aisles[0], vec![(0, 5)]);
    }

    #[test]
    fn rejects_truncated_input() {
        let err = Instance::parse("2 1 1\n1 0 3\n").unwrap_err();
        assert!(matches!(err, InstanceError::Truncated { .. }));
    }

    #[test]
    fn rejects_non_integer_token() {
        let err = Instance::parse("1 1 1\n1 0 x\n1 0 5\n0 3\n").unwrap_err();
        match err {
            InstanceError::BadToken { token, .. } => assert_eq!(token, "x"),
            other => panic!("expected BadToken, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_item() {
        let err = Instance::parse("1 1 1\n1 1 3\n1 0 5\n0 3\n").unwrap_err();
        assert!(matches!(
            err,
            InstanceError::ItemOutOfRange { item: 1, num_items: 1, .. }
        ));
    }

    #[test]
    fn rejects_zero_units() {
        let err = Instance::parse("1 1 1\n1 0 0\n1 0 5\n0 3\n").unwrap_err();
        assert!(matches!(err, InstanceError::ZeroUnits { .. }));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = Instance::parse("1 1 1\n1 0 3\n1 0 5\n5 3\n").unwrap_err();
        assert!(matches!(err, InstanceError::BadBounds { lb: 5, ub: 3 }));
    }

    #[test]
    fn adjacency_links_orders_and_aisles() {
        let text = "2 2 2\n1 0 2\n1 1 2\n1 0 2\n1 1 2\n0 10\n";
        let inst = Instance::parse(text).unwrap();
        let adj = inst.adjacency();
        assert_eq!(adj.order_aisles[0], vec![0]);
        assert_eq!(adj.order_aisles[1], vec![1]);
        assert_eq!(adj.aisle_orders[0], vec![0]);
        assert_eq!(adj.aisle_orders[1], vec![1]);
    }
}
