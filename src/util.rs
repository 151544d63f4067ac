pub trait FirstNul {
    fn first_nul_idx(&self) -> Option<usize>;
}

impl FirstNul for [u8] {
    fn first_nul_idx(&self) -> Option<usize> {
        self.iter().position(|b| *b == 0)
    }
}
